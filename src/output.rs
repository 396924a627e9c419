use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::error::Result;

/// Directory that receives every CSV, plot and export of a run.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Writes `rows` with a header row derived from the field names. An
    /// empty table produces an empty file.
    pub fn write_csv<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<PathBuf> {
        let path = self.path(name);
        write_csv(&path, rows)?;
        log::info!("wrote {} rows to {path:?}", rows.len());
        Ok(path)
    }
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Joins list-valued cells into a single CSV field.
pub fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items.into_iter().map(|x| x.to_string()).collect::<Vec<_>>().join(";")
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        mac: String,
        count: usize,
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out = OutputDir::create(dir.path().join("nested")).unwrap();
        let rows = vec![
            Row {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                count: 3,
            },
            Row {
                mac: "00:11:22:33:44:55".to_string(),
                count: 1,
            },
        ];
        let path = out.write_csv("rows.csv", &rows).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "mac,count\naa:bb:cc:dd:ee:ff,3\n00:11:22:33:44:55,1\n");
    }

    #[test]
    fn join_cells() {
        assert_eq!(join(["a", "b"]), "a;b");
        assert_eq!(join(Vec::<String>::new()), "");
    }
}
