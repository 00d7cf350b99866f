//! Persistence of the final result on the root rank.

use crate::error::Result;
use crate::partial::Partial;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Destination for the final result. Only rank 0 ever calls [`write`](Self::write).
pub trait ResultSink<R> {
    /// Persist `result`; the absent state must still produce an artifact.
    fn write(&mut self, result: &Partial<R>) -> Result<()>;
}

impl<R, S: ResultSink<R> + ?Sized> ResultSink<R> for &mut S {
    fn write(&mut self, result: &Partial<R>) -> Result<()> {
        (**self).write(result)
    }
}

/// On-disk document written by [`JsonFileSink`].
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ResultDocument<'a, R> {
    Merged { records: usize, result: &'a R },
    Empty { reason: &'a str },
}

/// Writes the final result as a JSON document.
///
/// A merged result becomes `{"status": "merged", "records": n, "result": ...}`;
/// the absent state becomes `{"status": "empty", "reason": "..."}`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Sink writing to `path`, truncating any existing file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSink { path: path.into() }
    }

    /// Output location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<R> ResultSink<R> for JsonFileSink
where
    R: Serialize + crate::capability::Mergeable,
{
    fn write(&mut self, result: &Partial<R>) -> Result<()> {
        let doc = match result {
            Partial::Present(r) => ResultDocument::Merged {
                records: r.record_count(),
                result: r,
            },
            Partial::Empty => ResultDocument::Empty { reason: "no data" },
            Partial::Failed(reason) => ResultDocument::Empty { reason },
        };
        let mut out = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut out, &doc)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps every written result in memory.
#[derive(Debug, Clone)]
pub struct MemorySink<R> {
    /// Results in write order
    pub written: Vec<Partial<R>>,
}

impl<R> Default for MemorySink<R> {
    fn default() -> Self {
        MemorySink {
            written: Vec::new(),
        }
    }
}

impl<R: Clone> ResultSink<R> for MemorySink<R> {
    fn write(&mut self, result: &Partial<R>) -> Result<()> {
        self.written.push(result.clone());
        Ok(())
    }
}

/// Hand the final result to `sink`, logging an absent result as an error.
pub fn persist<R, S>(sink: &mut S, result: &Partial<R>) -> Result<()>
where
    S: ResultSink<R> + ?Sized,
    R: crate::capability::Mergeable,
{
    match result.absence_reason() {
        Some(reason) => error!("no usable results from any process ({reason}); writing empty result"),
        None => info!(records = result.record_count(), "writing combined result"),
    }
    sink.write(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IncompatibleResultError;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Mean {
        value: f64,
        n: usize,
    }

    impl crate::capability::Mergeable for Mean {
        fn merge(&mut self, other: Self) -> std::result::Result<(), IncompatibleResultError> {
            let n = self.n + other.n;
            self.value = (self.value * self.n as f64 + other.value * other.n as f64) / n as f64;
            self.n = n;
            Ok(())
        }

        fn record_count(&self) -> usize {
            self.n
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_reader(File::open(path).unwrap()).unwrap()
    }

    #[test]
    fn merged_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonFileSink::new(dir.path().join("out.json"));
        persist(&mut sink, &Partial::Present(Mean { value: 0.5, n: 4 })).unwrap();
        let doc = read_json(sink.path());
        assert_eq!(doc["status"], "merged");
        assert_eq!(doc["records"], 4);
        assert_eq!(doc["result"]["value"], 0.5);
    }

    #[test]
    fn empty_marker_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonFileSink::new(dir.path().join("out.json"));
        persist::<Mean, _>(&mut sink, &Partial::Failed("all tasks failed".into())).unwrap();
        let doc = read_json(sink.path());
        assert_eq!(doc["status"], "empty");
        assert_eq!(doc["reason"], "all tasks failed");
    }

    #[test]
    fn unwritable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonFileSink::new(dir.path().join("missing").join("out.json"));
        assert!(persist::<Mean, _>(&mut sink, &Partial::Empty).is_err());
    }

    #[test]
    fn memory_sink_records_writes() {
        let mut sink = MemorySink::default();
        persist(&mut sink, &Partial::Present(Mean { value: 1.0, n: 1 })).unwrap();
        persist(&mut sink, &Partial::<Mean>::Empty).unwrap();
        assert_eq!(sink.written.len(), 2);
        assert!(sink.written[1].is_absent());
    }
}
