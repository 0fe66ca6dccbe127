//! Accepted/discarded partition shared by every source.
//!
//! The whole record set is held in memory between parsing and writing, so
//! the practical input size is bounded by RAM.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{SequenceRecord, has_forbidden_char};
use crate::error::KiraError;
use crate::extract::{AccessionRule, Extraction};
use crate::fasta;

pub const DISCARDED_SUFFIX: &str = "DISCARDED_SEQS.fasta";
pub const TABLE_SUFFIX: &str = ".taxid_table.tsv";

/// Accession -> original description, in first-insertion order.
/// Re-inserting an accession replaces its description in place.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl LookupTable {
    pub fn insert(&mut self, accession: String, description: String) {
        match self.index.get(&accession) {
            Some(&slot) => self.entries[slot].1 = description,
            None => {
                self.index.insert(accession.clone(), self.entries.len());
                self.entries.push((accession, description));
            }
        }
    }

    pub fn get(&self, accession: &str) -> Option<&str> {
        self.index
            .get(accession)
            .map(|&slot| self.entries[slot].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(acc, desc)| (acc.as_str(), desc.as_str()))
    }

    pub fn write_tsv(&self, path: &Path) -> Result<(), KiraError> {
        let file = File::create(path)
            .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", path.display())))?;
        let mut writer = BufWriter::new(file);
        for (accession, description) in self.iter() {
            writeln!(writer, "{accession}\t{description}")
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub clean: Utf8PathBuf,
    pub discarded: Utf8PathBuf,
    pub table: Utf8PathBuf,
}

impl OutputPaths {
    pub fn from_base(output: &Utf8Path) -> Self {
        Self {
            clean: output.to_path_buf(),
            discarded: Utf8PathBuf::from(format!("{output}{DISCARDED_SUFFIX}")),
            table: Utf8PathBuf::from(format!("{output}{TABLE_SUFFIX}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub accepted: Vec<SequenceRecord>,
    pub discarded: Vec<SequenceRecord>,
    pub lookup: LookupTable,
    pub suppressed: usize,
}

impl Partition {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.discarded.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub accepted: usize,
    pub discarded: usize,
    pub suppressed: usize,
    pub lookup_entries: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    rule: AccessionRule,
}

impl Normalizer {
    pub fn new(rule: AccessionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> AccessionRule {
        self.rule
    }

    pub fn partition<I>(&self, records: I) -> Partition
    where
        I: IntoIterator<Item = SequenceRecord>,
    {
        let mut partition = Partition::default();
        for mut record in records {
            let accession = match self.rule.extract(&record) {
                Extraction::Candidate(accession) if !has_forbidden_char(&accession) => {
                    Some(accession)
                }
                Extraction::Synthesized(accession) => Some(accession),
                Extraction::Candidate(_) => None,
                Extraction::Suppressed => {
                    partition.suppressed += 1;
                    None
                }
                Extraction::MissingField { index } => {
                    tracing::debug!(
                        header = %record.description,
                        index,
                        "description lacks the accession field"
                    );
                    None
                }
            };
            match accession {
                Some(accession) => {
                    partition
                        .lookup
                        .insert(accession.clone(), record.description.clone());
                    record.relabel(&accession);
                    partition.accepted.push(record);
                }
                None => partition.discarded.push(record),
            }
        }
        partition
    }

    /// Parses `input`, partitions it and writes the three artifacts.
    pub fn normalize_file(
        &self,
        input: &Path,
        outputs: &OutputPaths,
    ) -> Result<NormalizeSummary, KiraError> {
        let records = fasta::read_records(input)?;
        let read = records.len();
        let partition = self.partition(records);
        debug_assert_eq!(partition.total(), read);
        write_partition(&partition, outputs)
    }
}

pub fn write_partition(
    partition: &Partition,
    outputs: &OutputPaths,
) -> Result<NormalizeSummary, KiraError> {
    fasta::write_records(outputs.clean.as_std_path(), &partition.accepted)?;
    fasta::write_records(outputs.discarded.as_std_path(), &partition.discarded)?;
    partition.lookup.write_tsv(outputs.table.as_std_path())?;

    let summary = NormalizeSummary {
        accepted: partition.accepted.len(),
        discarded: partition.discarded.len(),
        suppressed: partition.suppressed,
        lookup_entries: partition.lookup.len(),
    };
    tracing::info!(
        "found {} sequences with incorrect accession format",
        summary.discarded
    );
    Ok(summary)
}
