use std::{
    error::Error,
    fmt, io,
    path::{Path, PathBuf},
};

use crate::pickle::PickleErr;

/// The result type used across the preparation pipeline.
pub type Result<T> = std::result::Result<T, PrepErr>;

/// Every failure the pipeline can surface. None of them are retried.
#[derive(Debug)]
pub enum PrepErr {
    /// The configuration was rejected before touching the filesystem or network.
    InvalidConfig(String),
    /// Downloading the archive failed.
    Transfer {
        url: String,
        source: Box<dyn Error + Send + Sync>,
    },
    /// The archive is missing, malformed or truncated.
    Extraction { archive: PathBuf, source: io::Error },
    /// A raw or preprocessed record could not be decoded.
    Deserialize { path: PathBuf, msg: String },
    /// A preprocessed record could not be encoded.
    Serialize { path: PathBuf, msg: String },
    /// A buffer does not fit the expected image layout.
    Shape {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// Any other filesystem failure.
    Io(io::Error),
}

impl PrepErr {
    pub(crate) fn transfer<E>(url: &str, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Transfer {
            url: url.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn deserialize(path: &Path, msg: impl fmt::Display) -> Self {
        Self::Deserialize {
            path: path.to_path_buf(),
            msg: msg.to_string(),
        }
    }

    pub(crate) fn serialize(path: &Path, msg: impl fmt::Display) -> Self {
        Self::Serialize {
            path: path.to_path_buf(),
            msg: msg.to_string(),
        }
    }

    pub(crate) fn pickle(path: &Path, err: PickleErr) -> Self {
        Self::deserialize(path, err)
    }
}

impl fmt::Display for PrepErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Transfer { url, source } => write!(f, "transfer of {url} failed: {source}"),
            Self::Extraction { archive, source } => {
                write!(f, "extraction of {} failed: {source}", archive.display())
            }
            Self::Deserialize { path, msg } => {
                write!(f, "could not decode {}: {msg}", path.display())
            }
            Self::Serialize { path, msg } => {
                write!(f, "could not encode {}: {msg}", path.display())
            }
            Self::Shape {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for PrepErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transfer { source, .. } => Some(source.as_ref()),
            Self::Extraction { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PrepErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
