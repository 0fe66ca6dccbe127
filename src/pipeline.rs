use std::fs;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::{BoldRequest, EmblRequest, MitofishRequest, NcbiRequest, SourceRequest};
use crate::download::Downloader;
use crate::error::KiraError;
use crate::extract::AccessionRule;
use crate::fetcher::{BatchFetcher, DEFAULT_BACKOFF, FetchReport};
use crate::ncbi::EntrezClient;
use crate::normalize::{Normalizer, OutputPaths};
use crate::workspace::Workspace;
use crate::{fasta, flatfile, fs_util, transcode};

/// File inside the MitoFish bundle that holds the sequences.
pub const MITOFISH_ENTRY: &str = "complete_partial_mitogenomes.fa";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub source: String,
    pub output: String,
    pub discarded_output: String,
    pub table_output: String,
    pub accepted: usize,
    pub discarded: usize,
    pub suppressed: usize,
    pub lookup_entries: usize,
    pub expected: Option<usize>,
    pub fetched: Option<usize>,
    pub failed_pages: Vec<usize>,
    pub finished_at: String,
}

/// Raw FASTA for one source, ready for normalization.
struct Staged {
    fasta: Utf8PathBuf,
    fetch: Option<FetchReport>,
}

pub struct Pipeline<E: EntrezClient, D: Downloader> {
    entrez: E,
    downloader: D,
    work_root: Option<Utf8PathBuf>,
    backoff: Duration,
}

impl<E: EntrezClient, D: Downloader> Pipeline<E, D> {
    pub fn new(entrez: E, downloader: D) -> Self {
        Self {
            entrez,
            downloader,
            work_root: None,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_work_root(mut self, root: Option<Utf8PathBuf>) -> Self {
        self.work_root = root;
        self
    }

    /// Delay between Entrez retries.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn ingest(
        &self,
        request: &SourceRequest,
        output: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, KiraError> {
        let started = Instant::now();
        let source = request.source();
        sink.event(ProgressEvent {
            message: format!("phase=Prepare; source {source}"),
            elapsed: None,
        });

        if let Some(parent) = output.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let workspace = match &self.work_root {
            Some(root) => Workspace::in_root(root)?,
            None => Workspace::new()?,
        };
        tracing::debug!(work_dir = %workspace.path(), "workspace ready");

        let staged = match request {
            SourceRequest::Ncbi(req) => self.stage_ncbi(req, &workspace, sink)?,
            SourceRequest::Mitofish(req) => self.stage_mitofish(req, &workspace, sink)?,
            SourceRequest::Embl(req) => self.stage_embl(req, &workspace, sink)?,
            SourceRequest::Bold(req) => self.stage_bold(req, &workspace, sink)?,
        };

        sink.event(ProgressEvent {
            message: "phase=Normalize; partitioning records".to_string(),
            elapsed: Some(started.elapsed()),
        });
        let outputs = OutputPaths::from_base(output);
        let normalizer = Normalizer::new(AccessionRule::for_source(source));
        let summary = normalizer.normalize_file(staged.fasta.as_std_path(), &outputs)?;
        sink.event(ProgressEvent {
            message: format!(
                "found {} sequences with incorrect accession format",
                summary.discarded
            ),
            elapsed: None,
        });

        sink.event(ProgressEvent {
            message: "phase=Cleanup; removing intermediate files".to_string(),
            elapsed: None,
        });
        workspace.close()?;

        let (expected, fetched, failed_pages) = match &staged.fetch {
            Some(report) => (
                Some(report.expected),
                Some(report.record_count),
                report.failed_pages(),
            ),
            None => (None, None, Vec::new()),
        };

        sink.event(ProgressEvent {
            message: format!("phase=Done; {} records written", summary.accepted),
            elapsed: Some(started.elapsed()),
        });
        Ok(IngestResult {
            source: source.to_string(),
            output: outputs.clean.to_string(),
            discarded_output: outputs.discarded.to_string(),
            table_output: outputs.table.to_string(),
            accepted: summary.accepted,
            discarded: summary.discarded,
            suppressed: summary.suppressed,
            lookup_entries: summary.lookup_entries,
            expected,
            fetched,
            failed_pages,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn stage_ncbi(
        &self,
        request: &NcbiRequest,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<Staged, KiraError> {
        sink.event(ProgressEvent {
            message: format!("ncbi.esearch db={}", request.database),
            elapsed: None,
        });
        let start = Instant::now();
        let session = self.entrez.search(&request.query, &request.database)?;
        sink.event(ProgressEvent {
            message: format!(
                "ncbi.esearch count={} latency_ms={}",
                session.count(),
                start.elapsed().as_millis()
            ),
            elapsed: None,
        });

        let fetcher = BatchFetcher::new(request.batch_size)?
            .with_backoff(self.backoff)
            .with_policy(request.page_policy);
        let raw = workspace.intermediate("ncbi", "fasta");
        let report = fetcher.fetch_all_with_progress(
            &self.entrez,
            &session,
            raw.as_std_path(),
            |done, total| {
                sink.event(ProgressEvent {
                    message: format!("phase=Download; page {done}/{total}"),
                    elapsed: Some(start.elapsed()),
                })
            },
        )?;
        Ok(Staged {
            fasta: raw,
            fetch: Some(report),
        })
    }

    fn stage_mitofish(
        &self,
        request: &MitofishRequest,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<Staged, KiraError> {
        sink.event(ProgressEvent {
            message: "phase=Download; mitofish bundle".to_string(),
            elapsed: None,
        });
        let archive = workspace.intermediate("mitofish", "zip");
        self.downloader
            .download(&request.url, archive.as_std_path())?;

        sink.event(ProgressEvent {
            message: "phase=Unpack; extracting mitogenomes".to_string(),
            elapsed: None,
        });
        let fasta = workspace.intermediate("mitofish", "fa");
        fs_util::extract_zip_entry(archive.as_std_path(), MITOFISH_ENTRY, fasta.as_std_path())?;
        fs_util::remove_if_exists(archive.as_std_path())?;
        Ok(Staged { fasta, fetch: None })
    }

    fn stage_embl(
        &self,
        request: &EmblRequest,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<Staged, KiraError> {
        let prefix = request.file_prefix();
        let files = release_files(&self.downloader.list_links(&request.release_url)?, &prefix);
        if files.is_empty() {
            return Err(KiraError::NoReleaseFiles(prefix));
        }

        let mut parts = Vec::with_capacity(files.len());
        for (index, name) in files.iter().enumerate() {
            sink.event(ProgressEvent {
                message: format!("phase=Download; {name} ({}/{})", index + 1, files.len()),
                elapsed: None,
            });
            let compressed = workspace.intermediate("embl", "dat.gz");
            self.downloader.download(
                &join_url(&request.release_url, name),
                compressed.as_std_path(),
            )?;

            let part = workspace.intermediate("embl", "fasta");
            let stats = flatfile::reformat_file(compressed.as_std_path(), part.as_std_path())?;
            tracing::info!(file = %name, records = stats.records, "reformatted division file");
            fs_util::remove_if_exists(compressed.as_std_path())?;
            parts.push(part);
        }

        sink.event(ProgressEvent {
            message: "phase=Merge; combining all EMBL downloaded fasta files".to_string(),
            elapsed: None,
        });
        let combined = workspace.intermediate("embl-combined", "fasta");
        let part_paths = parts.iter().map(|p| p.as_std_path()).collect::<Vec<_>>();
        fs_util::concat_files(&part_paths, combined.as_std_path())?;
        for part in &parts {
            fs_util::remove_if_exists(part.as_std_path())?;
        }
        Ok(Staged {
            fasta: combined,
            fetch: None,
        })
    }

    fn stage_bold(
        &self,
        request: &BoldRequest,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<Staged, KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Download; bold taxon {}", request.taxon),
            elapsed: None,
        });
        let raw = workspace.intermediate("bold-latin1", "fasta");
        self.downloader
            .download(&request.query_url(), raw.as_std_path())?;

        sink.event(ProgressEvent {
            message: "phase=Transcode; latin-1 to utf-8".to_string(),
            elapsed: None,
        });
        let fasta = workspace.intermediate("bold", "fasta");
        transcode::transcode_file(raw.as_std_path(), fasta.as_std_path())?;
        fs_util::remove_if_exists(raw.as_std_path())?;

        let downloaded = fasta::count_records(fasta.as_std_path())?;
        tracing::info!(records = downloaded, "bold download complete");
        Ok(Staged { fasta, fetch: None })
    }
}

/// Division files of a release listing, sorted by name.
pub fn release_files(links: &[String], prefix: &str) -> Vec<String> {
    let mut files = links
        .iter()
        .map(|link| link.rsplit('/').next().unwrap_or(link.as_str()))
        .filter(|name| name.starts_with(prefix) && name.ends_with(".dat.gz"))
        .map(|name| name.to_string())
        .collect::<Vec<_>>();
    files.sort();
    files.dedup();
    files
}

fn join_url(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}
