use crate::artifact::write_atomic;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Reads every record of a newline-delimited JSON file
///
/// Blank lines are ignored. A truncated final line (left by an interrupted
/// append) is logged and skipped; any other malformed line is an error.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;
    let last = lines.iter().rposition(|l| !l.trim().is_empty());

    let mut records = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) if Some(index) == last => {
                tracing::warn!(
                    "Skipping truncated last line {} of {}: {}",
                    index + 1,
                    path.display(),
                    e
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}

/// Writes a whole newline-delimited JSON file atomically
pub fn write_ndjson_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut buffer = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buffer, record)?;
        buffer.push(b'\n');
    }
    write_atomic(path, &buffer)
}

/// Append-only newline-delimited JSON stream
///
/// Used for streams that grow across batches (fetch metadata). Each call to
/// [`NdjsonAppender::flush`] makes the appended lines durable.
pub struct NdjsonAppender {
    writer: BufWriter<File>,
}

impl NdjsonAppender {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        n: u32,
    }

    #[test]
    fn test_appender_accumulates_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.ndjson");

        for n in 0..2 {
            let mut appender = NdjsonAppender::open(&path).unwrap();
            appender.append(&Line { n }).unwrap();
            appender.flush().unwrap();
        }

        let lines: Vec<Line> = read_ndjson(&path).unwrap();
        assert_eq!(lines, vec![Line { n: 0 }, Line { n: 1 }]);
    }

    #[test]
    fn test_truncated_last_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.ndjson");
        fs::write(&path, "{\"n\":1}\n\n{\"n\":2}\n{\"n\":").unwrap();

        let lines: Vec<Line> = read_ndjson(&path).unwrap();
        assert_eq!(lines, vec![Line { n: 1 }, Line { n: 2 }]);
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.ndjson");
        fs::write(&path, "{\"n\":1}\nnot json\n{\"n\":2}\n").unwrap();

        assert!(read_ndjson::<Line>(&path).is_err());
    }
}
