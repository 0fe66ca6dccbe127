//! Source-specific accession extraction.
//!
//! Each source labels its records differently; the rule picked for a run
//! turns a record into a candidate accession (or a reason to discard it)
//! and the normalizer does the rest.

use crate::domain::{SequenceRecord, Source};

/// Prefix for BOLD records that carry no GenBank accession.
pub const BOLD_FALLBACK_NAMESPACE: &str = "CRABS:";

/// Marker BOLD appends to withdrawn records.
pub const BOLD_SUPPRESSED_MARKER: &str = "-SUPPRESSED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Accession still subject to discard-set validation.
    Candidate(String),
    /// Namespaced fallback built by the rule itself; accepted as is.
    Synthesized(String),
    /// Record is withdrawn upstream.
    Suppressed,
    /// Description has too few `|` fields for the rule.
    MissingField { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessionRule {
    /// `AB123456.1 description` -> text before the first `.`.
    Ncbi,
    /// `|`-delimited; field 1, or field 3 when field 1 is a GI number.
    Mitofish,
    /// The record id, already normalized by the flat-file reformatter.
    Embl,
    /// `|`-delimited BOLD labels with a namespaced fallback.
    Bold,
}

impl AccessionRule {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::Ncbi => AccessionRule::Ncbi,
            Source::Mitofish => AccessionRule::Mitofish,
            Source::Embl => AccessionRule::Embl,
            Source::Bold => AccessionRule::Bold,
        }
    }

    pub fn extract(&self, record: &SequenceRecord) -> Extraction {
        let description = record.description.as_str();
        match self {
            AccessionRule::Ncbi => {
                let head = description.split('.').next().unwrap_or_default();
                Extraction::Candidate(head.to_string())
            }
            AccessionRule::Mitofish => {
                let fields = description.split('|').collect::<Vec<_>>();
                let Some(primary) = fields.get(1) else {
                    return Extraction::MissingField { index: 1 };
                };
                if !is_numeric(primary) {
                    return Extraction::Candidate(primary.to_string());
                }
                match fields.get(3) {
                    Some(fallback) => Extraction::Candidate(fallback.to_string()),
                    None => Extraction::MissingField { index: 3 },
                }
            }
            AccessionRule::Embl => Extraction::Candidate(record.id.clone()),
            AccessionRule::Bold => {
                if description.ends_with(BOLD_SUPPRESSED_MARKER) {
                    return Extraction::Suppressed;
                }
                let fields = description.split('|').collect::<Vec<_>>();
                if fields.len() == 4 {
                    let genbank = fields[3].split('.').next().unwrap_or_default();
                    return Extraction::Candidate(genbank.to_string());
                }
                match fields.get(1) {
                    Some(taxon) => {
                        Extraction::Synthesized(format!("{BOLD_FALLBACK_NAMESPACE}{taxon}"))
                    }
                    None => Extraction::MissingField { index: 1 },
                }
            }
        }
    }
}

fn is_numeric(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|ch| ch.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(header: &str) -> SequenceRecord {
        SequenceRecord::from_header(header, "ACGT".to_string())
    }

    fn candidate(rule: AccessionRule, header: &str) -> Extraction {
        rule.extract(&record(header))
    }

    #[test]
    fn ncbi_strips_version() {
        assert_eq!(
            candidate(AccessionRule::Ncbi, "MN123456.1 Gadus morhua 12S"),
            Extraction::Candidate("MN123456".to_string())
        );
    }

    #[test]
    fn ncbi_without_dot_keeps_whole_description() {
        assert_eq!(
            candidate(AccessionRule::Ncbi, "MN123456 Gadus morhua"),
            Extraction::Candidate("MN123456 Gadus morhua".to_string())
        );
    }

    #[test]
    fn mitofish_primary_field() {
        assert_eq!(
            candidate(AccessionRule::Mitofish, "gb|NC_002333|Danio rerio"),
            Extraction::Candidate("NC_002333".to_string())
        );
    }

    #[test]
    fn mitofish_gi_number_uses_field_three() {
        assert_eq!(
            candidate(AccessionRule::Mitofish, "gi|123456|gb|AB123456.1|"),
            Extraction::Candidate("AB123456.1".to_string())
        );
    }

    #[test]
    fn mitofish_missing_fields() {
        assert_eq!(
            candidate(AccessionRule::Mitofish, "AB123456"),
            Extraction::MissingField { index: 1 }
        );
        assert_eq!(
            candidate(AccessionRule::Mitofish, "gi|123456|gb"),
            Extraction::MissingField { index: 3 }
        );
    }

    #[test]
    fn embl_uses_id() {
        assert_eq!(
            candidate(AccessionRule::Embl, "AB123456 extra"),
            Extraction::Candidate("AB123456".to_string())
        );
    }

    #[test]
    fn bold_genbank_field() {
        assert_eq!(
            candidate(
                AccessionRule::Bold,
                "ABFJ123-10|Salmo trutta|COI-5P|KF123456.1"
            ),
            Extraction::Candidate("KF123456".to_string())
        );
    }

    #[test]
    fn bold_fallback_namespace() {
        assert_eq!(
            candidate(AccessionRule::Bold, "ABFJ124-10|Salmo_trutta|COI-5P"),
            Extraction::Synthesized("CRABS:Salmo_trutta".to_string())
        );
    }

    #[test]
    fn bold_suppressed_wins() {
        assert_eq!(
            candidate(
                AccessionRule::Bold,
                "ABFJ125-10|Salmo trutta|COI-5P|KF123457-SUPPRESSED"
            ),
            Extraction::Suppressed
        );
    }
}
