//! Single-column CSV persistence for the crawled-URL list, crawl queue, and
//! page index (spec §6). Ported from `FileTools.py`: each row holds exactly
//! one field, quoted by the `csv` crate whenever the value itself contains a
//! comma, quote, or newline.

use std::collections::HashSet;
use std::path::Path;

use crate::error::PersistError;

fn io_err(path: &Path, source: std::io::Error) -> PersistError {
    PersistError::Read {
        path: path.display().to_string(),
        source,
    }
}

/// Reads a single-column CSV file into a `Vec`, in file order. Returns an
/// empty `Vec` if the file doesn't exist (mirrors `FileTools.read_1d_csv_to_list`
/// with `must_exist=False`).
pub fn read_1d_csv_to_vec(path: impl AsRef<Path>) -> Result<Vec<String>, PersistError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| PersistError::Read {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(field) = record.get(0) {
            out.push(field.to_string());
        }
    }
    Ok(out)
}

pub fn read_1d_csv_to_set(path: impl AsRef<Path>) -> Result<HashSet<String>, PersistError> {
    Ok(read_1d_csv_to_vec(path)?.into_iter().collect())
}

/// Overwrites `path` with one row per item. Mirrors `FileTools.write_iterable_to_csv`.
pub fn write_iterable_to_csv<I, S>(path: impl AsRef<Path>, data: I) -> Result<(), PersistError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    write_csv_file(path, data, false)
}

/// Appends one row per item to `path`, creating it if missing. Mirrors
/// `FileTools.append_iterable_to_csv`.
pub fn append_iterable_to_csv<I, S>(path: impl AsRef<Path>, data: I) -> Result<(), PersistError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    write_csv_file(path, data, true)
}

fn write_csv_file<I, S>(path: impl AsRef<Path>, data: I, append: bool) -> Result<(), PersistError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
        }
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| PersistError::Write {
            path: path.display().to_string(),
            source: e,
        })?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    for item in data {
        writer.write_record([item.as_ref()])?;
    }
    writer.flush().map_err(|e| PersistError::Write {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urls.csv");

        write_iterable_to_csv(&path, ["https://a.example/", "https://b.example/"]).unwrap();
        let read_back = read_1d_csv_to_vec(&path).unwrap();

        assert_eq!(read_back, vec!["https://a.example/", "https://b.example/"]);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.csv");

        assert_eq!(read_1d_csv_to_vec(&path).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn append_adds_rows_without_truncating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.csv");

        write_iterable_to_csv(&path, ["first"]).unwrap();
        append_iterable_to_csv(&path, ["second"]).unwrap();

        assert_eq!(read_1d_csv_to_vec(&path).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn fields_with_commas_round_trip_quoted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("weird.csv");

        write_iterable_to_csv(&path, [r#"{"a":1,"b":2}"#]).unwrap();
        assert_eq!(read_1d_csv_to_vec(&path).unwrap(), vec![r#"{"a":1,"b":2}"#]);
    }
}
