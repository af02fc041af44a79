//! Streaming result log reader.

use crate::AnalyzeError;
use std::io::BufRead;
use std::time::SystemTime;
use surge_types::{Event, RunConfig};

/// Reads a result log one line at a time.
///
/// The first line must be a `config` event. Every following line must
/// parse as an [`Event`]; blank lines are skipped.
pub struct LogReader<R> {
    reader: R,
    config: RunConfig,
    opened: SystemTime,
    line: usize,
    buf: String,
}

impl<R: BufRead> LogReader<R> {
    /// Read and check the `config` line.
    pub fn new(mut reader: R) -> Result<Self, AnalyzeError> {
        let mut buf = String::new();
        let read = reader.read_line(&mut buf).map_err(|source| AnalyzeError::Read {
            line: 1,
            source,
        })?;
        if read == 0 {
            return Err(AnalyzeError::Empty);
        }

        match parse_line(1, &buf)? {
            Event::Config { config, time } => Ok(Self {
                reader,
                config,
                opened: time,
                line: 1,
                buf,
            }),
            other => Err(AnalyzeError::MissingConfig {
                found: other.type_name(),
            }),
        }
    }

    /// Configuration recorded by the run.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Time of the `config` line.
    pub fn opened(&self) -> SystemTime {
        self.opened
    }

    /// Number of the last line read.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Next event, or `None` at end of input.
    pub fn next_event(&mut self) -> Result<Option<Event>, AnalyzeError> {
        loop {
            self.buf.clear();
            self.line += 1;
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|source| AnalyzeError::Read {
                    line: self.line,
                    source,
                })?;
            if read == 0 {
                return Ok(None);
            }
            if self.buf.trim().is_empty() {
                continue;
            }
            return parse_line(self.line, &self.buf).map(Some);
        }
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = Result<Event, AnalyzeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

fn parse_line(line: usize, text: &str) -> Result<Event, AnalyzeError> {
    serde_json::from_str(text.trim_end()).map_err(|source| AnalyzeError::Parse { line, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CONFIG: &str = r#"{"type":"config","time":"2024-01-01T00:00:00.000000000Z","config":{"node":{"policy":{"network-id":"n","base-fee":"10000","base-reserve":"1000000","operations-limit":100}},"concurrency":2,"init-account":"aa","timeout":"1m","request-timeout":"30s","confirm-duration":"1m","result-output":"r.log","operations":1}}"#;

    fn read_all(text: &str) -> Result<Vec<Event>, AnalyzeError> {
        LogReader::new(Cursor::new(text.to_string()))?.collect()
    }

    #[test]
    fn test_reads_events_after_config() {
        let text = format!(
            "{CONFIG}\n{}\n\n{}\n",
            r#"{"type":"started","time":"2024-01-01T00:00:01Z"}"#,
            r#"{"type":"ended","time":"2024-01-01T00:01:01Z","extra":true}"#,
        );
        let mut reader = LogReader::new(Cursor::new(text)).unwrap();
        assert_eq!(reader.config().concurrency, 2);

        let first = reader.next_event().unwrap().unwrap();
        assert_eq!(first.type_name(), "started");
        let second = reader.next_event().unwrap().unwrap();
        assert_eq!(second.type_name(), "ended");
        assert!(reader.next_event().unwrap().is_none());
    }

    #[test]
    fn test_first_line_must_be_config() {
        let err = read_all(r#"{"type":"started","time":"2024-01-01T00:00:01Z"}"#).unwrap_err();
        assert!(matches!(err, AnalyzeError::MissingConfig { found: "started" }));

        assert!(matches!(read_all(""), Err(AnalyzeError::Empty)));
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let text = format!("{CONFIG}\n{}\n", r#"{"type":"bogus","time":"2024-01-01T00:00:01Z"}"#);
        let err = read_all(&text).unwrap_err();
        assert!(matches!(err, AnalyzeError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let text = format!(
            "{CONFIG}\n{}\nnot json\n",
            r#"{"type":"started","time":"2024-01-01T00:00:01Z"}"#
        );
        let err = read_all(&text).unwrap_err();
        assert!(matches!(err, AnalyzeError::Parse { line: 3, .. }));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_huge_numeric_elapsed_is_a_parse_error() {
        let payment = r#"{"type":"payment","time":"2024-01-01T00:00:02Z","elapsed":1e30,"count":1,"addresses":["bb"],"amount":"1","source":"aa","error":null}"#;
        let text = format!("{CONFIG}\n{payment}\n");
        let err = read_all(&text).unwrap_err();
        assert!(matches!(err, AnalyzeError::Parse { line: 2, .. }));
    }
}
