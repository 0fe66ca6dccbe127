use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid source: {0} (expected ncbi, mitofish, embl or bold)")]
    InvalidSource(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing config file kira-ri.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("NCBI search reported {count} records but returned {ids} ids")]
    #[diagnostic(help("the history session is incomplete; rerun the search"))]
    SessionCountMismatch { count: usize, ids: usize },

    #[error("page at offset {start} failed after {attempts} attempts")]
    #[diagnostic(help("set page_policy to \"best-effort\" to keep the pages that did arrive"))]
    PageExhausted { start: usize, attempts: usize },

    #[error("download failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("no release files matching {0}")]
    NoReleaseFiles(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("archive does not contain {0}")]
    MissingArchiveEntry(String),

    #[error("malformed FASTA: {0}")]
    FastaParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    /// Server-side failures that the Entrez page loop may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, KiraError::NcbiStatus { status, .. } if (500..=599).contains(status))
    }
}
