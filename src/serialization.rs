//! Writers for entity records.
//!
//! Records are written as NDJSON (one entity per line) or as a single JSON
//! array. Both writers count the records they emit.

use std::io::Write;
use std::str::FromStr;

use serde::Serialize;

/// Error type for serialization operations
#[derive(Debug)]
pub enum SerializationError {
    JsonError(serde_json::Error),
    IoError(std::io::Error),
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
        }
    }
}

impl std::error::Error for SerializationError {}

/// Output layout for entity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Ndjson,
    JsonArray,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(OutputFormat::Ndjson),
            "json" | "array" => Ok(OutputFormat::JsonArray),
            other => Err(format!("Unknown output format '{}'", other)),
        }
    }
}

/// Common interface over the record writers.
pub trait RecordWriter {
    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError>;

    /// Close the output. Must be called once after the last record.
    fn finish(&mut self) -> Result<(), SerializationError>;

    fn records_written(&self) -> usize;
}

/// NDJSON (Newline Delimited JSON) writer
pub struct NdjsonWriter<W: Write> {
    writer: W,
    count: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Write a single record as an NDJSON line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        self.count += 1;
        Ok(())
    }

    pub fn write_all<T: Serialize>(&mut self, records: &[T]) -> Result<(), SerializationError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> RecordWriter for NdjsonWriter<W> {
    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        self.write(record)
    }

    fn finish(&mut self) -> Result<(), SerializationError> {
        self.flush()
    }

    fn records_written(&self) -> usize {
        self.count
    }
}

/// JSON array writer. The opening bracket is written up front and the
/// closing one by [`RecordWriter::finish`].
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    count: usize,
    finished: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            count: 0,
            finished: false,
        })
    }
}

impl<W: Write> RecordWriter for JsonArrayWriter<W> {
    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        if self.count > 0 {
            write!(self.writer, ",")?;
        }
        let json = serde_json::to_string(record)?;
        write!(self.writer, "{}", json)?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SerializationError> {
        if !self.finished {
            writeln!(self.writer, "]")?;
            self.finished = true;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn records_written(&self) -> usize {
        self.count
    }
}
