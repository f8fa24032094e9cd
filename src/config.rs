use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::{PrepErr, Result};

pub const CIFAR100_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-100-python.tar.gz";

const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(128) {
    Some(n) => n,
    None => unreachable!(),
};

/// Height, width and channel count of a stored image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ImageDims {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageDims {
    /// Number of bytes a single image occupies.
    pub fn pixels(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl Default for ImageDims {
    fn default() -> Self {
        Self {
            height: 32,
            width: 32,
            channels: 3,
        }
    }
}

/// Spatial resolution images are resized to on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub height: usize,
    pub width: usize,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
        }
    }
}

/// Every location, size and ratio the pipeline stages share.
///
/// All file names are resolved against `root`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub root: PathBuf,
    pub archive_url: String,
    pub archive_name: String,
    pub extract_dir: String,
    pub train_file: String,
    pub valid_file: String,
    pub test_file: String,
    pub valid_ratio: f64,
    pub batch_size: NonZeroUsize,
    pub image: ImageDims,
    pub resize_to: Resolution,
    pub num_classes: usize,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            archive_url: CIFAR100_URL.to_string(),
            archive_name: "cifar-100-python.tar.gz".to_string(),
            extract_dir: "cifar-100-python".to_string(),
            train_file: "cifar100_preprocess_train.safetensors".to_string(),
            valid_file: "cifar100_preprocess_validation.safetensors".to_string(),
            test_file: "cifar100_preprocess_testing.safetensors".to_string(),
            valid_ratio: 0.1,
            batch_size: DEFAULT_BATCH_SIZE,
            image: ImageDims::default(),
            resize_to: Resolution::default(),
            num_classes: 100,
        }
    }
}

impl PrepConfig {
    /// Creates the default configuration rooted at `root`.
    pub fn rooted<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// Missing fields take their default value.
    ///
    /// # Errors
    /// Returns `PrepErr::Io` if the file cannot be read and
    /// `PrepErr::InvalidConfig` if it cannot be parsed or fails validation.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PrepErr::InvalidConfig(format!("cannot parse '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every stage relies on.
    ///
    /// # Errors
    /// Returns `PrepErr::InvalidConfig` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let non_empty = [
            ("archive_url", &self.archive_url),
            ("archive_name", &self.archive_name),
            ("extract_dir", &self.extract_dir),
            ("train_file", &self.train_file),
            ("valid_file", &self.valid_file),
            ("test_file", &self.test_file),
        ];
        for (field, value) in non_empty {
            if value.trim().is_empty() {
                return Err(PrepErr::InvalidConfig(format!("{field} must not be empty")));
            }
        }

        // Also rejects NaN.
        if !(self.valid_ratio > 0.0 && self.valid_ratio < 1.0) {
            return Err(PrepErr::InvalidConfig(format!(
                "valid_ratio ({}) must lie strictly between 0 and 1",
                self.valid_ratio
            )));
        }

        let ImageDims {
            height,
            width,
            channels,
        } = self.image;
        if height == 0 || width == 0 {
            return Err(PrepErr::InvalidConfig(
                "image height and width must be greater than 0".into(),
            ));
        }
        if channels != 3 {
            return Err(PrepErr::InvalidConfig(format!(
                "images must have 3 channels, got {channels}"
            )));
        }

        if self.resize_to.height == 0 || self.resize_to.width == 0 {
            return Err(PrepErr::InvalidConfig(
                "resize_to height and width must be greater than 0".into(),
            ));
        }

        if self.num_classes == 0 || self.num_classes > usize::from(u8::MAX) + 1 {
            return Err(PrepErr::InvalidConfig(format!(
                "num_classes ({}) must be between 1 and 256",
                self.num_classes
            )));
        }

        Ok(())
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(&self.archive_name)
    }

    pub fn extract_path(&self) -> PathBuf {
        self.root.join(&self.extract_dir)
    }

    pub fn train_path(&self) -> PathBuf {
        self.root.join(&self.train_file)
    }

    pub fn valid_path(&self) -> PathBuf {
        self.root.join(&self.valid_file)
    }

    pub fn test_path(&self) -> PathBuf {
        self.root.join(&self.test_file)
    }
}
