//! Writers for distilled events.
//!
//! Events can be written as the human-readable report, as NDJSON or as a
//! single JSON array.

use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Error type for serialization operations
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes events as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single event as an NDJSON line
    pub fn write<T: Serialize>(&mut self, event: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
///
/// Writes events as one JSON array; [`JsonArrayWriter::finish`] closes it.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a new JSON array writer and write the opening bracket
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self { writer, first: true })
    }

    pub fn write<T: Serialize>(&mut self, event: &T) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        let json = serde_json::to_string(event)?;
        write!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Finish writing the array and close the bracket
    pub fn finish(mut self) -> Result<(), SerializationError> {
        writeln!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Output format for distilled events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// The `Display` report of each event
    #[default]
    Text,
    Ndjson,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "ndjson" => Ok(OutputFormat::Ndjson),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Writes events in any [`OutputFormat`].
pub enum EventWriter<W: Write> {
    Text(W),
    Ndjson(NdjsonWriter<W>),
    Json(JsonArrayWriter<W>),
}

impl<W: Write> EventWriter<W> {
    pub fn new(format: OutputFormat, writer: W) -> Result<Self, SerializationError> {
        Ok(match format {
            OutputFormat::Text => EventWriter::Text(writer),
            OutputFormat::Ndjson => EventWriter::Ndjson(NdjsonWriter::new(writer)),
            OutputFormat::Json => EventWriter::Json(JsonArrayWriter::new(writer)?),
        })
    }

    pub fn write<T>(&mut self, event: &T) -> Result<(), SerializationError>
    where
        T: Serialize + fmt::Display,
    {
        match self {
            EventWriter::Text(writer) => {
                write!(writer, "{}", event)?;
                Ok(())
            }
            EventWriter::Ndjson(writer) => writer.write(event),
            EventWriter::Json(writer) => writer.write(event),
        }
    }

    /// Write a free-form line. Only the text format carries these; it
    /// returns false for the JSON formats so callers can report elsewhere.
    pub fn note(&mut self, line: &str) -> Result<bool, SerializationError> {
        match self {
            EventWriter::Text(writer) => {
                writeln!(writer, "{}", line)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn finish(self) -> Result<(), SerializationError> {
        match self {
            EventWriter::Text(mut writer) => {
                writer.flush()?;
                Ok(())
            }
            EventWriter::Ndjson(mut writer) => writer.flush(),
            EventWriter::Json(writer) => writer.finish(),
        }
    }
}
