use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use zip::ZipArchive;

use crate::error::KiraError;

/// Extracts the first entry whose file name is `name` (at any depth) to
/// `destination`.
pub fn extract_zip_entry(zip_path: &Path, name: &str, destination: &Path) -> Result<(), KiraError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| KiraError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| KiraError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(entry_path) = entry.enclosed_name() else {
            return Err(KiraError::Archive(
                "zip entry path traversal detected".to_string(),
            ));
        };
        if entry_path.file_name().and_then(|n| n.to_str()) != Some(name) {
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| KiraError::Archive(err.to_string()))?;
        return Ok(());
    }
    Err(KiraError::MissingArchiveEntry(name.to_string()))
}

pub fn concat_files<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<u64, KiraError> {
    let out = fs::File::create(output)
        .map_err(|err| KiraError::Filesystem(format!("create {}: {err}", output.display())))?;
    let mut writer = BufWriter::new(out);
    let mut total = 0;
    for input in inputs {
        let input = input.as_ref();
        let mut source = fs::File::open(input)
            .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", input.display())))?;
        total += io::copy(&mut source, &mut writer)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(total)
}

pub fn remove_if_exists(path: &Path) -> Result<(), KiraError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(KiraError::Filesystem(format!(
            "remove {}: {err}",
            path.display()
        ))),
    }
}
