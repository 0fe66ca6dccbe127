use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use needletail::{FastxReader, parse_fastx_reader};

use crate::domain::SequenceRecord;
use crate::error::KiraError;

/// Record stream over `needletail`, yielding owned `SequenceRecord`s.
/// Empty input yields no records instead of a parse error.
pub struct FastaReader<'a> {
    inner: Option<Box<dyn FastxReader + 'a>>,
    done: bool,
}

impl<'a> FastaReader<'a> {
    pub fn new<R: Read + Send + 'a>(reader: R) -> Result<Self, KiraError> {
        let mut buffered = BufReader::new(reader);
        let is_empty = buffered
            .fill_buf()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?
            .is_empty();
        if is_empty {
            return Ok(Self {
                inner: None,
                done: true,
            });
        }
        let inner =
            parse_fastx_reader(buffered).map_err(|err| KiraError::FastaParse(err.to_string()))?;
        Ok(Self {
            inner: Some(inner),
            done: false,
        })
    }
}

impl Iterator for FastaReader<'_> {
    type Item = Result<SequenceRecord, KiraError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let inner = self.inner.as_mut()?;
        let parsed = match inner.next()? {
            Ok(record) => Ok(SequenceRecord::from_header(
                &String::from_utf8_lossy(record.id()),
                String::from_utf8_lossy(&record.seq()).into_owned(),
            )),
            Err(err) => Err(KiraError::FastaParse(err.to_string())),
        };
        if parsed.is_err() {
            self.done = true;
        }
        Some(parsed)
    }
}

pub fn open(path: &Path) -> Result<FastaReader<'static>, KiraError> {
    let file = File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    FastaReader::new(file)
}

pub fn read_records(path: &Path) -> Result<Vec<SequenceRecord>, KiraError> {
    open(path)?.collect()
}

pub fn count_records(path: &Path) -> Result<usize, KiraError> {
    let mut count = 0;
    for record in open(path)? {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Two-line form: header on one line, all residues on the next.
pub fn write_record<W: Write>(writer: &mut W, record: &SequenceRecord) -> io::Result<()> {
    writeln!(writer, ">{}", record.description)?;
    writeln!(writer, "{}", record.residues)
}

pub fn write_records<'a, I>(path: &Path, records: I) -> Result<usize, KiraError>
where
    I: IntoIterator<Item = &'a SequenceRecord>,
{
    let file = File::create(path)
        .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", path.display())))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for record in records {
        write_record(&mut writer, record).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(written)
}
