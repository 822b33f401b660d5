//! JSON export of harvested entries

use crate::storage::ResultStore;
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every stored record to `writer` as a pretty-printed JSON array
///
/// Records are ordered by key. Returns the number of records written.
pub fn export_results<W: Write>(store: &dyn ResultStore, mut writer: W) -> Result<usize> {
    let records = store.all_results()?;
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(records.len())
}

/// Exports every stored record to a file, replacing it if present
pub fn export_to_path(store: &dyn ResultStore, path: &Path) -> Result<usize> {
    let file = File::create(path)?;
    let count = export_results(store, BufWriter::new(file))?;
    tracing::info!("Exported {} entries to {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ResultRecord, SqliteStorage};
    use serde_json::json;

    #[test]
    fn test_export_empty_store() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let mut buffer = Vec::new();

        let count = export_results(&storage, &mut buffer).unwrap();

        assert_eq!(count, 0);
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed, json!([]));
    }

    #[test]
    fn test_export_keeps_greek_unescaped() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .upsert(&ResultRecord::new(
                "λόγος",
                "LSJ",
                json!({"language": "greek", "text": "λόγος, ὁ, computation"}),
            ))
            .unwrap();
        storage
            .upsert(&ResultRecord::new("ἀγαθός", "LSJ", json!({"text": "good"})))
            .unwrap();

        let mut buffer = Vec::new();
        let count = export_results(&storage, &mut buffer).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("λόγος, ὁ, computation"));

        let records: Vec<ResultRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(records.len(), 2);
        let logos = records.iter().find(|r| r.key == "λόγος").unwrap();
        assert_eq!(logos.payload["language"], "greek");
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .upsert(&ResultRecord::new("a", "LSJ", json!({})))
            .unwrap();

        assert_eq!(export_to_path(&storage, &path).unwrap(), 1);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.trim_start().starts_with('['));
    }
}
