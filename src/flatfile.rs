//! EMBL flat-file release to FASTA.
//!
//! Only two line kinds matter: `AC` lines name a new record, and the
//! indented lines following an `SQ` header carry residues with position
//! numbers interleaved.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::domain::SequenceRecord;
use crate::error::KiraError;
use crate::fasta;

const ACCESSION_TAG: &str = "AC";
const SEQUENCE_TAG: &str = "SQ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingRecord,
    InSequenceBlock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReformatStats {
    pub records: usize,
    /// Residue lines seen before any `AC` line.
    pub orphan_lines: usize,
    /// Input ended inside a sequence block.
    pub unterminated: bool,
}

struct Reformatter<'w, W: Write> {
    writer: &'w mut W,
    state: State,
    current: Option<SequenceRecord>,
    stats: ReformatStats,
}

impl<'w, W: Write> Reformatter<'w, W> {
    fn new(writer: &'w mut W) -> Self {
        Self {
            writer,
            state: State::SeekingRecord,
            current: None,
            stats: ReformatStats::default(),
        }
    }

    fn line(&mut self, line: &str) -> Result<(), KiraError> {
        if line.starts_with(ACCESSION_TAG) {
            // Every AC line opens a record, including continuation lines.
            self.flush()?;
            let accession = accession_token(line);
            self.current = Some(SequenceRecord {
                id: accession.clone(),
                description: accession,
                residues: String::new(),
            });
            self.state = State::SeekingRecord;
            return Ok(());
        }

        if self.state == State::InSequenceBlock && line.starts_with(' ') {
            match self.current.as_mut() {
                Some(record) => record.residues.extend(
                    line.chars()
                        .filter(|ch| !ch.is_ascii_digit() && !ch.is_whitespace())
                        .map(|ch| ch.to_ascii_uppercase()),
                ),
                None => self.stats.orphan_lines += 1,
            }
            return Ok(());
        }

        self.state = if line.contains(SEQUENCE_TAG) {
            State::InSequenceBlock
        } else {
            State::SeekingRecord
        };
        Ok(())
    }

    fn flush(&mut self) -> Result<(), KiraError> {
        if let Some(record) = self.current.take() {
            fasta::write_record(&mut *self.writer, &record)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            self.stats.records += 1;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ReformatStats, KiraError> {
        self.flush()?;
        self.stats.unterminated = self.state == State::InSequenceBlock;
        Ok(self.stats)
    }
}

/// Text between the field tag and the first `;`.
fn accession_token(line: &str) -> String {
    let rest = &line[ACCESSION_TAG.len()..];
    rest.split(';').next().unwrap_or_default().trim().to_string()
}

pub fn reformat<R: BufRead, W: Write>(reader: R, writer: &mut W) -> Result<ReformatStats, KiraError> {
    let mut reformatter = Reformatter::new(writer);
    for line in reader.lines() {
        let line = line.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        reformatter.line(&line)?;
    }
    reformatter.finish()
}

/// Reformats one division file; `.gz` inputs are decompressed on the fly.
pub fn reformat_file(input: &Path, output: &Path) -> Result<ReformatStats, KiraError> {
    let file = File::open(input)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", input.display())))?;
    let is_gzip = input.extension().map(|ext| ext == "gz").unwrap_or(false);
    let reader: Box<dyn Read> = if is_gzip {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let out = File::create(output)
        .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", output.display())))?;
    let mut writer = BufWriter::new(out);
    tracing::info!("formatting {} to fasta format", input.display());
    let stats = reformat(BufReader::new(reader), &mut writer)?;
    writer
        .flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;

    if stats.unterminated {
        tracing::warn!("{} ended inside a sequence block", input.display());
    }
    if stats.orphan_lines > 0 {
        tracing::debug!(
            orphan_lines = stats.orphan_lines,
            "residue lines without an accession were dropped"
        );
    }
    Ok(stats)
}
