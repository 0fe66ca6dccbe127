use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::error::KiraError;

pub const CHUNK_SIZE: usize = 1 << 20;

/// Re-encodes ISO-8859-1 bytes as UTF-8, one fixed-size chunk at a time.
/// Returns the number of input bytes consumed.
pub fn latin1_to_utf8<R: Read, W: Write>(mut reader: R, writer: &mut W) -> io::Result<u64> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut encoded = String::with_capacity(CHUNK_SIZE);
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        encoded.clear();
        encoded.extend(chunk[..read].iter().map(|&byte| char::from(byte)));
        writer.write_all(encoded.as_bytes())?;
        total += read as u64;
    }
    Ok(total)
}

pub fn transcode_file(input: &Path, output: &Path) -> Result<u64, KiraError> {
    let source = File::open(input)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", input.display())))?;
    let target = File::create(output)
        .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", output.display())))?;
    let mut writer = BufWriter::new(target);
    let total = latin1_to_utf8(source, &mut writer)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    writer
        .flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(total)
}
