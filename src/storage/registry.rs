//! Persisted tree registry (§6: "Persisted registry").
//!
//! Two small files alongside the backing file: one recording
//! `(name, meta_pid)` pairs, one recording auxiliary per-tree state
//! (registration options) in the same order. Both are rewritten atomically
//! — write to a temp file, then rename over the original — on `persist()`.

use crate::common::PageId;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Options captured at `register()` time (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeOptions {
    pub enable_wal: bool,
    pub use_bulk_insert: bool,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub meta_pid: PageId,
    pub options: TreeOptions,
}

pub struct RegistryFile {
    names_path: PathBuf,
    aux_path: PathBuf,
}

impl RegistryFile {
    pub fn new(dir: &str) -> Self {
        Self {
            names_path: Path::new(dir).join("trees.registry"),
            aux_path: Path::new(dir).join("trees.aux"),
        }
    }

    /// Atomically rewrite both registry files from `entries`, in order.
    pub fn persist(&self, entries: &[RegistryEntry]) -> Result<()> {
        let mut names = String::new();
        let mut aux = String::new();
        for e in entries {
            names.push_str(&format!("{}\t{}\n", e.name, e.meta_pid));
            aux.push_str(&format!(
                "{}\t{}\n",
                e.options.enable_wal as u8, e.options.use_bulk_insert as u8
            ));
        }
        write_atomically(&self.names_path, &names)?;
        write_atomically(&self.aux_path, &aux)?;
        Ok(())
    }

    /// Read back the registry written by [`Self::persist`]. Returns an
    /// empty vector if no registry files exist yet (fresh store).
    pub fn restore(&self) -> Result<Vec<RegistryEntry>> {
        if !self.names_path.exists() {
            return Ok(Vec::new());
        }
        let names = fs::read_to_string(&self.names_path)?;
        let aux = fs::read_to_string(&self.aux_path).unwrap_or_default();

        let mut entries = Vec::new();
        for (line, aux_line) in names.lines().zip(aux.lines().chain(std::iter::repeat(""))) {
            let mut parts = line.splitn(2, '\t');
            let name = parts.next().unwrap_or_default().to_string();
            let meta_pid: PageId = parts.next().unwrap_or("0").parse().unwrap_or(0);

            let mut aux_parts = aux_line.splitn(2, '\t');
            let enable_wal = aux_parts.next().unwrap_or("0") == "1";
            let use_bulk_insert = aux_parts.next().unwrap_or("0") == "1";

            entries.push(RegistryEntry {
                name,
                meta_pid,
                options: TreeOptions {
                    enable_wal,
                    use_bulk_insert,
                },
            });
        }
        Ok(entries)
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let reg = RegistryFile::new(dir.path().to_str().unwrap());
        let entries = vec![
            RegistryEntry {
                name: "t1".into(),
                meta_pid: 1,
                options: TreeOptions {
                    enable_wal: true,
                    use_bulk_insert: false,
                },
            },
            RegistryEntry {
                name: "t2".into(),
                meta_pid: 42,
                options: TreeOptions::default(),
            },
        ];
        reg.persist(&entries).unwrap();

        let back = reg.restore().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].name, "t1");
        assert_eq!(back[0].meta_pid, 1);
        assert!(back[0].options.enable_wal);
        assert_eq!(back[1].meta_pid, 42);
    }

    #[test]
    fn restore_with_no_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = RegistryFile::new(dir.path().to_str().unwrap());
        assert!(reg.restore().unwrap().is_empty());
    }
}
