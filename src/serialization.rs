//! NDJSON input and output.
//!
//! Records are read one Zotero-style item per line; extracted documents are
//! written back one per line.

use crate::document::Document;
use crate::record::{Library, Record, RecordError};
use std::io::{BufRead, Read, Write};

/// Error type for serialization operations
#[derive(Debug)]
pub enum SerializationError {
    JsonError(serde_json::Error),
    IoError(std::io::Error),
    /// A line that parsed as JSON but is not a usable record.
    InvalidRecord { line: usize, error: RecordError },
    InvalidLibrary(RecordError),
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::JsonError(err)
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::IoError(err)
    }
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializationError::JsonError(e) => write!(f, "JSON error: {}", e),
            SerializationError::IoError(e) => write!(f, "IO error: {}", e),
            SerializationError::InvalidRecord { line, error } => write!(f, "Line {}: {}", line, error),
            SerializationError::InvalidLibrary(e) => write!(f, "Invalid collections: {}", e),
        }
    }
}

impl std::error::Error for SerializationError {}

/// Writes documents as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write one document and its line terminator.
    pub fn write(&mut self, doc: &Document) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, doc)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all(&mut self, docs: &[Document]) -> Result<(), SerializationError> {
        for doc in docs {
            self.write(doc)?;
        }
        Ok(())
    }

    /// Flush and return the number of documents written.
    pub fn finish(mut self) -> Result<usize, SerializationError> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Read one record per non-blank line.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<Record>, SerializationError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item: serde_json::Value = serde_json::from_str(&line)?;
        let record = Record::from_item(item).map_err(|error| SerializationError::InvalidRecord {
            line: index + 1,
            error,
        })?;
        records.push(record);
    }
    tracing::debug!(records = records.len(), "Read records");
    Ok(records)
}

/// Read a JSON array of collections.
pub fn read_library<R: Read>(reader: R) -> Result<Library, SerializationError> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    Library::from_json(value).map_err(SerializationError::InvalidLibrary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FieldValue;
    use std::io::Cursor;

    #[test]
    fn test_ndjson_writer() {
        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);

        writer
            .write(&Document::new("A").with_value("title", "Alice"))
            .unwrap();
        writer
            .write(&Document::new("B").with_value("featured", FieldValue::Bool(true)))
            .unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"id":"A","values":{"title":"Alice"}}"#);
        assert_eq!(lines[1], r#"{"id":"B","values":{"featured":true}}"#);
    }

    #[test]
    fn test_read_records_skips_blank_lines() {
        let input = "{\"key\":\"A\",\"data\":{\"title\":\"x\"}}\n\n{\"data\":{\"key\":\"B\"}}\n";
        let records = read_records(Cursor::new(input)).unwrap();

        let keys: Vec<_> = records.iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(records[0].get("key"), Some(&serde_json::json!("A")));
    }

    #[test]
    fn test_read_records_reports_line() {
        let input = "{\"key\":\"A\"}\n{\"data\":{}}\n";
        let err = read_records(Cursor::new(input)).unwrap_err();

        assert!(matches!(err, SerializationError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_read_library() {
        let input = r#"[{"key": "T", "data": {"key": "T", "name": "Theme", "parentCollection": false}}]"#;
        let library = read_library(Cursor::new(input)).unwrap();
        assert_eq!(library.len(), 1);

        let err = read_library(Cursor::new("{}")).unwrap_err();
        assert!(matches!(err, SerializationError::InvalidLibrary(_)));
    }
}
