use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;

use crate::{
    config::PrepConfig,
    error::{PrepErr, Result},
    source::ProgressReporter,
};

const CHUNK_SIZE: usize = 64 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a call to [`Fetcher::fetch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The archive was downloaded; holds the number of bytes written.
    Downloaded(u64),
    /// The archive was already on disk, nothing was written.
    AlreadyPresent,
}

/// Downloads the dataset archive unless it is already on disk.
#[derive(Debug, Clone)]
pub struct Fetcher {
    url: String,
    archive: PathBuf,
}

impl Fetcher {
    pub fn new<P: Into<PathBuf>>(url: &str, archive: P) -> Self {
        Self {
            url: url.to_string(),
            archive: archive.into(),
        }
    }

    pub fn from_config(config: &PrepConfig) -> Self {
        Self::new(&config.archive_url, config.archive_path())
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Streams the archive to disk, feeding `progress` as bytes arrive.
    ///
    /// # Errors
    /// Returns `PrepErr::Transfer` if the request fails, the server answers
    /// with a non-success status or the stream breaks mid-way. A partially
    /// written file is left in place.
    pub fn fetch(&self, progress: &mut dyn ProgressReporter) -> Result<FetchOutcome> {
        if self.archive.is_file() {
            info!("{} already exists", self.archive.display());
            return Ok(FetchOutcome::AlreadyPresent);
        }

        info!("fetching {} into {}", self.url, self.archive.display());

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| PrepErr::transfer(&self.url, e))?;

        let response = client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PrepErr::transfer(&self.url, e))?;

        let total = response.content_length();
        let file = File::create(&self.archive)?;
        let mut writer = BufWriter::new(file);

        let written = copy_with_progress(response, &mut writer, total, progress)
            .and_then(|n| writer.flush().map(|_| n))
            .map_err(|e| PrepErr::transfer(&self.url, e))?;

        Ok(FetchOutcome::Downloaded(written))
    }
}

/// Copies `reader` into `writer` chunk by chunk, reporting the running total.
///
/// # Returns
/// The number of bytes copied.
pub fn copy_with_progress<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    total: Option<u64>,
    progress: &mut dyn ProgressReporter,
) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut transferred = 0u64;

    progress.start(total);
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        writer.write_all(&buf[..read])?;
        transferred += read as u64;
        progress.advance(transferred);
    }
    progress.finish(transferred);

    Ok(transferred)
}
