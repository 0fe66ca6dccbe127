use std::cell::Cell;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::{Builder, TempDir};

use crate::error::KiraError;

/// Scratch directory for one ingestion run. Intermediate files live under a
/// fresh temporary directory and disappear when the workspace is closed or
/// dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    path: Utf8PathBuf,
    counter: Cell<usize>,
}

impl Workspace {
    /// Workspace under `~/.cache/kira-reference-ingest/work`.
    pub fn new() -> Result<Self, KiraError> {
        Self::in_root(&default_root()?)
    }

    pub fn in_root(root: &Utf8Path) -> Result<Self, KiraError> {
        fs::create_dir_all(root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let dir = Builder::new()
            .prefix("kira-ri-")
            .tempdir_in(root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|_| KiraError::Filesystem("non-utf8 work directory".to_string()))?;
        Ok(Self {
            dir,
            path,
            counter: Cell::new(0),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// A path inside the workspace that no other call has handed out.
    pub fn intermediate(&self, stem: &str, extension: &str) -> Utf8PathBuf {
        let n = self.counter.get();
        self.counter.set(n + 1);
        self.path.join(format!("{stem}-{n:03}.{extension}"))
    }

    pub fn close(self) -> Result<(), KiraError> {
        self.dir
            .close()
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }
}

pub fn default_root() -> Result<Utf8PathBuf, KiraError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".cache")
                    .join("kira-reference-ingest")
                    .join("work"),
            )
            .ok()
        })
        .ok_or_else(|| KiraError::Filesystem("unable to resolve cache directory".to_string()))
}
