//! Line-delimited JSON event source.
//!
//! One lifecycle event per line. Blank lines are ignored; lines that do not
//! parse are logged and skipped so one bad publisher message cannot stall
//! the daemon.

use std::path::Path;

use anyhow::Context;
use lbsync_core::LifecycleEvent;
use lbsync_core::config::EventsConfig;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};

/// Reader type for sources opened from configuration.
pub type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;

pub struct EventSource<R> {
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> EventSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Next well-formed event, or `None` once the input is exhausted.
    ///
    /// Cancel safe: dropping the future between lines loses nothing.
    pub async fn next_event(&mut self) -> anyhow::Result<Option<LifecycleEvent>> {
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .context("failed to read event source")?
            else {
                return Ok(None);
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match LifecycleEvent::from_json(line) {
                Ok(event) => {
                    debug!(line = self.line_no, action = event.action(), "event received");
                    return Ok(Some(event));
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "malformed event skipped");
                }
            }
        }
    }

    /// Lines that did not parse as events.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl EventSource<BoxedReader> {
    /// Open the source named by the `[events]` section.
    pub async fn open(config: &EventsConfig) -> anyhow::Result<Self> {
        let reader: BoxedReader = match config {
            EventsConfig::Stdin => {
                info!("reading events from stdin");
                Box::new(BufReader::new(tokio::io::stdin()))
            }
            EventsConfig::File { path } => Box::new(open_file(path).await?),
        };
        Ok(Self::new(reader))
    }
}

async fn open_file(path: &Path) -> anyhow::Result<BufReader<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open event file {}", path.display()))?;
    info!(path = %path.display(), "reading events from file");
    Ok(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_events_and_skips_garbage() {
        let input = concat!(
            r#"{"action":"create_application","app_name":"app1","namespace":"ns1"}"#,
            "\n\n",
            "not json\n",
            r#"{"action":"reboot","app_name":"app1","namespace":"ns1"}"#,
            "\n",
            r#"{"action":"add_gear","app_name":"app1","namespace":"ns1","public_address":"10.0.0.1","public_port":"8080"}"#,
            "\n",
        );
        let mut source = EventSource::new(input.as_bytes());

        let first = source.next_event().await.unwrap().unwrap();
        assert_eq!(first.action(), "create_application");

        let second = source.next_event().await.unwrap().unwrap();
        assert_eq!(
            second,
            LifecycleEvent::AddGear {
                app_name: "app1".into(),
                namespace: "ns1".into(),
                public_address: "10.0.0.1".into(),
                public_port: 8080,
            }
        );

        assert!(source.next_event().await.unwrap().is_none());
        assert_eq!(source.skipped(), 2);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_read() {
        let input = r#"{"action":"delete_application","app_name":"a","namespace":"n"}"#;
        let mut source = EventSource::new(input.as_bytes());
        assert!(source.next_event().await.unwrap().is_some());
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn opens_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"action":"create_application","app_name":"a","namespace":"n"}}"#
        )
        .unwrap();

        let config = EventsConfig::File {
            path: file.path().to_path_buf(),
        };
        let mut source = EventSource::open(&config).await.unwrap();
        assert_eq!(
            source.next_event().await.unwrap().map(|e| e.app_name().to_string()),
            Some("a".to_string())
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let config = EventsConfig::File {
            path: "/nonexistent/lbsync/events".into(),
        };
        assert!(EventSource::open(&config).await.is_err());
    }
}
