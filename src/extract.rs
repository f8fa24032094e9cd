use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use tar::Archive;

use crate::{
    config::PrepConfig,
    error::{PrepErr, Result},
};

/// What a call to [`Extractor::extract`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The archive was unpacked; holds the number of entries written.
    Extracted(usize),
    /// The target directory already existed, nothing was written.
    AlreadyPresent,
}

/// Unpacks a `.tar.gz` archive unless its top-level directory already exists.
#[derive(Debug, Clone)]
pub struct Extractor {
    archive: PathBuf,
    dest: PathBuf,
    expected_dir: PathBuf,
}

impl Extractor {
    /// # Args
    /// * `archive` - The gzipped tarball.
    /// * `dest` - Where the archive members are unpacked.
    /// * `expected_dir` - The directory the archive is known to create.
    pub fn new<A, D, E>(archive: A, dest: D, expected_dir: E) -> Self
    where
        A: Into<PathBuf>,
        D: Into<PathBuf>,
        E: Into<PathBuf>,
    {
        Self {
            archive: archive.into(),
            dest: dest.into(),
            expected_dir: expected_dir.into(),
        }
    }

    pub fn from_config(config: &PrepConfig) -> Self {
        Self::new(
            config.archive_path(),
            config.root.clone(),
            config.extract_path(),
        )
    }

    pub fn expected_dir(&self) -> &Path {
        &self.expected_dir
    }

    /// # Errors
    /// Returns `PrepErr::Extraction` if the archive cannot be opened, is not a
    /// valid gzipped tarball, or does not produce the expected directory.
    pub fn extract(&self) -> Result<ExtractOutcome> {
        if self.expected_dir.is_dir() {
            info!("{} already exists", self.expected_dir.display());
            return Ok(ExtractOutcome::AlreadyPresent);
        }

        info!(
            "extracting {} into {}",
            self.archive.display(),
            self.dest.display()
        );

        let fail = |source: std::io::Error| PrepErr::Extraction {
            archive: self.archive.clone(),
            source,
        };

        let file = File::open(&self.archive).map_err(fail)?;
        let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

        let mut count = 0;
        for entry in archive.entries().map_err(fail)? {
            let mut entry = entry.map_err(fail)?;
            let member = entry.path().map_err(fail)?.into_owned();
            // `unpack_in` skips members escaping `dest` and reports false.
            if entry.unpack_in(&self.dest).map_err(fail)? {
                debug!("unpacked {}", member.display());
                count += 1;
            } else {
                warn!(
                    "skipped {}: it would land outside {}",
                    member.display(),
                    self.dest.display()
                );
            }
        }

        if !self.expected_dir.is_dir() {
            return Err(fail(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "archive did not contain {}",
                    self.expected_dir.display()
                ),
            )));
        }

        Ok(ExtractOutcome::Extracted(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use flate2::{write::GzEncoder, Compression};

    fn write_archive(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn extracts_once_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar.gz");
        write_archive(&archive, &[("set/train", b"tr"), ("set/test", b"te")]);

        let extractor = Extractor::new(&archive, dir.path(), dir.path().join("set"));

        assert_eq!(extractor.extract().unwrap(), ExtractOutcome::Extracted(2));
        assert_eq!(std::fs::read(dir.path().join("set/train")).unwrap(), b"tr");

        std::fs::remove_file(&archive).unwrap();
        assert_eq!(extractor.extract().unwrap(), ExtractOutcome::AlreadyPresent);
    }

    #[test]
    fn members_escaping_dest_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        std::fs::create_dir(&dest).unwrap();
        let archive = dir.path().join("a.tar.gz");

        let file = File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
        for (name, data) in [("set/train", &b"tr"[..]), ("../escaped", &b"x"[..])] {
            // `append_data` refuses `..`, so the name is written raw.
            let mut header = tar::Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();

        let extractor = Extractor::new(&archive, &dest, dest.join("set"));
        assert_eq!(extractor.extract().unwrap(), ExtractOutcome::Extracted(1));
        assert!(dest.join("set/train").is_file());
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn malformed_archive_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar.gz");
        std::fs::write(&archive, b"this is not a gzip stream").unwrap();

        let extractor = Extractor::new(&archive, dir.path(), dir.path().join("set"));
        assert!(matches!(
            extractor.extract(),
            Err(PrepErr::Extraction { .. })
        ));
    }

    #[test]
    fn archive_without_expected_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.tar.gz");
        write_archive(&archive, &[("other/train", b"x")]);

        let extractor = Extractor::new(&archive, dir.path(), dir.path().join("set"));
        assert!(matches!(
            extractor.extract(),
            Err(PrepErr::Extraction { .. })
        ));
    }

    #[test]
    fn missing_archive_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(
            dir.path().join("missing.tar.gz"),
            dir.path(),
            dir.path().join("set"),
        );
        assert!(matches!(
            extractor.extract(),
            Err(PrepErr::Extraction { .. })
        ));
    }
}
