use crate::artifact::write_atomic;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Writes a CSV table with a header row, atomically
pub fn write_csv_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    write_atomic(path, &bytes)
}

/// Reads every row of a CSV table with a header row
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::UrlRecord;
    use tempfile::TempDir;

    #[test]
    fn test_url_table_header_and_empty_option() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("urls.csv");
        let rows = vec![UrlRecord {
            url: "https://example.com/a".to_string(),
            status_code: 200,
            content_type: "text/html".to_string(),
            size: 42,
            last_modified: None,
        }];

        write_csv_atomic(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("url,status_code,content_type,size,last_modified\n"));
        let back: Vec<UrlRecord> = read_csv(&path).unwrap();
        assert_eq!(back, rows);
    }
}
