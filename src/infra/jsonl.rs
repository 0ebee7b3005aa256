//! JSON-lines table files shared by the file-backed stores.
//!
//! A table is loaded whole on open and rewritten whole after every mutation.
//! Rewrites go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous contents intact.

use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::core::StoreError;

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// One `<table>.jsonl` file inside a store directory.
#[derive(Debug, Clone)]
pub struct JsonlTable {
    path: PathBuf,
}

impl JsonlTable {
    /// Locate `table` under `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        create_dir_all(dir).map_err(backend)?;
        Ok(Self {
            path: dir.join(format!("{table}.jsonl")),
        })
    }

    /// Path of the table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row. A missing file is an empty table.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on I/O failure or a malformed row.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(backend)?;
        let mut rows = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(backend)?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|e| {
                StoreError::Backend(format!("{}:{}: {e}", self.path.display(), n + 1))
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Replace the table contents with `rows`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] on serialization or I/O failure.
    pub fn rewrite<'a, T, I>(&self, rows: I) -> Result<(), StoreError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .map_err(backend)?;
            let mut writer = BufWriter::new(file);
            for row in rows {
                let line = serde_json::to_string(row).map_err(backend)?;
                writeln!(writer, "{line}").map_err(backend)?;
            }
            writer.flush().map_err(backend)?;
        }
        fs::rename(&tmp, &self.path).map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("capacity-lease-jsonl-{name}-{}", uuid::Uuid::new_v4()));
        create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_table_is_empty() {
        let dir = scratch_dir("missing");
        let table = JsonlTable::open(&dir, "rows").unwrap();
        let rows: Vec<u32> = table.load().unwrap();
        assert!(rows.is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = scratch_dir("rewrite");
        let table = JsonlTable::open(&dir, "rows").unwrap();
        table.rewrite(&[1u32, 2, 3]).unwrap();
        table.rewrite(&[9u32]).unwrap();
        let rows: Vec<u32> = table.load().unwrap();
        assert_eq!(rows, vec![9]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let dir = scratch_dir("malformed");
        let table = JsonlTable::open(&dir, "rows").unwrap();
        fs::write(table.path(), "1\nnot json\n").unwrap();
        let err = table.load::<u32>().unwrap_err();
        assert!(err.to_string().contains(":2:"), "{err}");
        let _ = fs::remove_dir_all(dir);
    }
}
