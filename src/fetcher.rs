use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::domain::PagePolicy;
use crate::error::KiraError;
use crate::fasta;
use crate::ncbi::{EntrezClient, WebSession};

pub const MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Fetched { start: usize, bytes: usize },
    Failed { start: usize, attempts: usize },
}

impl PageOutcome {
    pub fn start(&self) -> usize {
        match self {
            PageOutcome::Fetched { start, .. } | PageOutcome::Failed { start, .. } => *start,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub expected: usize,
    pub record_count: usize,
    pub pages: Vec<PageOutcome>,
}

impl FetchReport {
    pub fn failed_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|page| matches!(page, PageOutcome::Failed { .. }))
            .map(PageOutcome::start)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_pages().is_empty()
    }
}

/// Sequential paged efetch against one history session.
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    batch_size: usize,
    max_attempts: usize,
    backoff: Duration,
    policy: PagePolicy,
}

impl BatchFetcher {
    pub fn new(batch_size: usize) -> Result<Self, KiraError> {
        if batch_size == 0 {
            return Err(KiraError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            batch_size,
            max_attempts: MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            policy: PagePolicy::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_policy(mut self, policy: PagePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn fetch_all<C>(
        &self,
        client: &C,
        session: &WebSession,
        output: &Path,
    ) -> Result<FetchReport, KiraError>
    where
        C: EntrezClient + ?Sized,
    {
        self.fetch_all_with_progress(client, session, output, |_, _| {})
    }

    /// Fetches every page in ascending order, appending payloads to
    /// `output`, then re-reads `output` to count what actually arrived.
    pub fn fetch_all_with_progress<C, F>(
        &self,
        client: &C,
        session: &WebSession,
        output: &Path,
        mut progress: F,
    ) -> Result<FetchReport, KiraError>
    where
        C: EntrezClient + ?Sized,
        F: FnMut(usize, usize),
    {
        let starts = page_starts(session.count(), self.batch_size);
        let file = File::create(output)
            .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", output.display())))?;
        let mut writer = BufWriter::new(file);
        let mut pages = Vec::with_capacity(starts.len());

        for (done, start) in starts.iter().copied().enumerate() {
            match self.fetch_page(client, session, start)? {
                Some(payload) => {
                    writer
                        .write_all(payload.as_bytes())
                        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
                    pages.push(PageOutcome::Fetched {
                        start,
                        bytes: payload.len(),
                    });
                }
                None => match self.policy {
                    PagePolicy::Strict => {
                        writer
                            .flush()
                            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
                        return Err(KiraError::PageExhausted {
                            start,
                            attempts: self.max_attempts,
                        });
                    }
                    PagePolicy::BestEffort => {
                        tracing::warn!(start, "skipping page after exhausting retries");
                        pages.push(PageOutcome::Failed {
                            start,
                            attempts: self.max_attempts,
                        });
                    }
                },
            }
            progress(done + 1, starts.len());
        }

        writer
            .flush()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        drop(writer);

        let record_count = fasta::count_records(output)?;
        if record_count < session.count() {
            tracing::warn!(
                expected = session.count(),
                fetched = record_count,
                "fetched fewer records than the search reported"
            );
        }
        Ok(FetchReport {
            expected: session.count(),
            record_count,
            pages,
        })
    }

    /// `Ok(None)` when every attempt hit a transient server error.
    fn fetch_page<C>(
        &self,
        client: &C,
        session: &WebSession,
        start: usize,
    ) -> Result<Option<String>, KiraError>
    where
        C: EntrezClient + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            match client.fetch_page(session, start, self.batch_size) {
                Ok(payload) => return Ok(Some(payload)),
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        start,
                        attempt,
                        max_attempts = self.max_attempts,
                        "received error from server: {err}"
                    );
                    if attempt < self.max_attempts {
                        thread::sleep(self.backoff);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Start offsets of every page covering `[0, count)`.
pub fn page_starts(count: usize, batch_size: usize) -> Vec<usize> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..count).step_by(batch_size).collect()
}
