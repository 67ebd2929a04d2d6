use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::HarvestError;

/// Prefix of in-flight download files; hidden so they never count as downloaded.
pub const PARTIAL_PREFIX: &str = ".commons-harvest-";

/// Answers "was this file downloaded already?" for the fetch loop.
pub trait DownloadLedger {
    fn contains(&self, file_name: &str) -> bool;
    fn destination(&self, file_name: &str) -> PathBuf;
    fn present_count(&self) -> Result<usize, HarvestError>;
}

/// Directory-backed ledger: a file is downloaded when it exists under `root`.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: Utf8PathBuf,
}

impl OutputStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path_for(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(file_name)
    }

    pub fn ensure_root(&self) -> Result<(), HarvestError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(|err| HarvestError::OutputDir {
            path: self.root.to_string(),
            message: err.to_string(),
        })?;
        if !self.root.as_std_path().is_dir() {
            return Err(HarvestError::OutputDir {
                path: self.root.to_string(),
                message: "not a directory".to_string(),
            });
        }
        Ok(())
    }

    /// Visible entries only, like a shell `*` glob.
    pub fn list_files(&self) -> Result<Vec<String>, HarvestError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

impl DownloadLedger for OutputStore {
    fn contains(&self, file_name: &str) -> bool {
        self.path_for(file_name).as_std_path().exists()
    }

    fn destination(&self, file_name: &str) -> PathBuf {
        self.path_for(file_name).into_std_path_buf()
    }

    fn present_count(&self) -> Result<usize, HarvestError> {
        Ok(self.list_files()?.len())
    }
}

/// Copies `reader` into `destination` through a sibling temp file, `chunk_size` bytes at a time.
/// Whatever sat at `destination` before (e.g. a partial file) is replaced.
pub fn write_chunked<R: Read>(
    reader: &mut R,
    destination: &Path,
    chunk_size: usize,
) -> Result<u64, HarvestError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| HarvestError::Filesystem(err.to_string()))?;

    let mut temp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(parent)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut written = 0u64;
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|err| HarvestError::Http(err.to_string()))?;
        if read == 0 {
            break;
        }
        temp.write_all(&buffer[..read])
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        written += read as u64;
    }
    temp.flush()
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

    temp.persist(destination)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(written)
}
