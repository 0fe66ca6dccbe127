use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Characters that disqualify a derived accession.
pub const DISCARD_SET: [char; 17] = [
    '@', '#', '$', '%', '&', '(', ')', '!', '<', '?', '|', ',', '.', '+', '=', '`', '~',
];

pub fn has_forbidden_char(accession: &str) -> bool {
    accession.chars().any(|ch| DISCARD_SET.contains(&ch))
}

/// One FASTA-shaped record. `id` is the first header token, `description`
/// the whole header line without the leading `>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub description: String,
    pub residues: String,
}

impl SequenceRecord {
    pub fn from_header(header: &str, residues: String) -> Self {
        let description = header.trim_end().to_string();
        let id = description
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            description,
            residues,
        }
    }

    /// Replaces both identifier and description with the accession.
    pub fn relabel(&mut self, accession: &str) {
        self.id = accession.to_string();
        self.description = accession.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Ncbi,
    Mitofish,
    Embl,
    Bold,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ncbi => "ncbi",
            Source::Mitofish => "mitofish",
            Source::Embl => "embl",
            Source::Bold => "bold",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ncbi" => Ok(Source::Ncbi),
            "mitofish" => Ok(Source::Mitofish),
            "embl" => Ok(Source::Embl),
            "bold" => Ok(Source::Bold),
            _ => Err(KiraError::InvalidSource(value.to_string())),
        }
    }
}

/// What the batch fetcher does with a page whose retries ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PagePolicy {
    /// Stop the run with an error.
    #[default]
    Strict,
    /// Skip the page, log it and keep going.
    BestEffort,
}
