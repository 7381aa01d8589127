use crate::constants::RESULT_HEADER;
use crate::io::open_writer;
use crate::query::ResultRow;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives the collated rows once a job has finished.
pub trait ResultSink {
    fn persist(&mut self, rows: &[ResultRow]) -> Result<()>;
}

/// Writes `station;started_trips` followed by one `id;count` line per row.
/// Zero-count rows are skipped; there is no trailing newline.
pub fn write_rows<W: Write>(out: &mut W, rows: &[ResultRow]) -> Result<()> {
    out.write_all(RESULT_HEADER.as_bytes())?;
    for row in rows.iter().filter(|r| r.started_trips > 0) {
        write!(out, "\n{}", row)?;
    }
    Ok(())
}

pub struct CsvResultSink {
    path: PathBuf,
}

impl CsvResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }

    /// Sibling file the rows are staged in before the rename.
    fn staging_path(&self) -> PathBuf {
        let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn stage(&self, staging: &Path, rows: &[ResultRow]) -> Result<()> {
        let mut writer = open_writer(staging)?;
        write_rows(&mut writer, rows).with_context(|| format!("write {}", staging.display()))?;
        writer.flush().with_context(|| format!("flush {}", staging.display()))?;
        Ok(())
    }
}

impl ResultSink for CsvResultSink {
    /// The result file only appears once every row is written and flushed.
    fn persist(&mut self, rows: &[ResultRow]) -> Result<()> {
        let staging = self.staging_path();
        let res = self.stage(&staging, rows).and_then(|()| {
            fs::rename(&staging, &self.path)
                .with_context(|| format!("rename {} to {}", staging.display(), self.path.display()))
        });
        if let Err(e) = res {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        info!(path = %self.path.display(), rows = rows.len(), "Result written");
        Ok(())
    }
}

/// Keeps rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<ResultRow>,
}

impl ResultSink for MemorySink {
    fn persist(&mut self, rows: &[ResultRow]) -> Result<()> {
        self.rows = rows.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_rows_without_trailing_newline() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[ResultRow::new("A", 3), ResultRow::new("B", 1)]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "station;started_trips\nA;3\nB;1");
    }

    #[test]
    fn empty_result_is_header_only() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "station;started_trips");
    }

    #[test]
    fn zero_rows_are_omitted() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &[ResultRow::new("A", 0), ResultRow::new("B", 2)]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "station;started_trips\nB;2");
    }

    #[test]
    fn csv_sink_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("query1.csv");
        let mut sink = CsvResultSink::new(&path);
        sink.persist(&[ResultRow::new("7", 12)]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "station;started_trips\n7;12");
        assert!(!dir.path().join("out").join(".query1.csv.tmp").exists());
    }

    #[test]
    fn failed_persist_leaves_no_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        // a directory squatting on the result path makes the final rename fail
        let path = dir.path().join("query1.csv");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();
        let mut sink = CsvResultSink::new(&path);
        assert!(sink.persist(&[ResultRow::new("7", 12)]).is_err());
        assert!(path.is_dir());
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["query1.csv".to_string()]);
    }

    #[test]
    fn memory_sink_keeps_rows() {
        let mut sink = MemorySink::default();
        sink.persist(&[ResultRow::new("A", 1)]).unwrap();
        assert_eq!(sink.rows, vec![ResultRow::new("A", 1)]);
    }
}
