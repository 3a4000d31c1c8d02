//! Shared tabular output
//!
//! Every worker appends to the same CSV file. Rows are written whole and
//! flushed one at a time; their order across workers is not defined.

use csv::{Writer, WriterBuilder};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SampleResult;

pub struct TableWriter {
    path: PathBuf,
    writer: Mutex<Writer<File>>,
}

impl TableWriter {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path) -> SampleResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = WriterBuilder::new().flexible(true).from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    /// Append the values of `fields` as one row, in order
    pub fn append(&self, fields: &[(String, String)]) -> SampleResult<()> {
        let mut writer = self.writer.lock();
        writer.write_record(fields.iter().map(|(_, value)| value.as_str()))?;
        writer.flush()?;
        debug!("Appended {} fields to {:?}", fields.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn row(values: &[(&str, &str)]) -> Vec<(String, String)> {
        values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_rows_are_values_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let table = TableWriter::open(&path).unwrap();

        table
            .append(&row(&[("identifier", "http://tun.fi/GP.1"), ("Genus", "Bombus")]))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "http://tun.fi/GP.1,Bombus\n");
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        TableWriter::open(&path).unwrap().append(&row(&[("a", "1")])).unwrap();
        TableWriter::open(&path).unwrap().append(&row(&[("a", "2"), ("b", "3")])).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2,3\n");
    }

    #[test]
    fn test_concurrent_rows_stay_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let table = Arc::new(TableWriter::open(&path).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for j in 0..25 {
                        let id = format!("W{}.{}", i, j);
                        table.append(&row(&[("identifier", &id), ("x", "y")])).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 100);
        assert!(lines.iter().all(|l| l.ends_with(",y") && l.starts_with('W')));
    }
}
