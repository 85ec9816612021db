//! Output of projected views for the daemon and CLI

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::store::Notice;
use crate::view::DashboardView;

/// Writes dashboard snapshots and notices
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Console, // Default
        }
    }
}

/// Envelope for JSON output so consumers can tell records apart
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum Record<'a> {
    Dashboard(&'a DashboardView),
    Notice(&'a Notice),
}

impl OutputHandler {
    /// Create a new output handler
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(OutputHandler { format, writer })
    }

    /// Write the dashboard projection
    pub fn write_dashboard(&mut self, view: &DashboardView) -> Result<(), Box<dyn std::error::Error>> {
        match &self.format {
            OutputFormat::Json | OutputFormat::Jsonl => self.write_record(&Record::Dashboard(view)),
            OutputFormat::Console => {
                let output = render_dashboard(view);
                self.write_output(&output)
            }
        }
    }

    /// Write an operator notice
    pub fn write_notice(&mut self, notice: &Notice) -> Result<(), Box<dyn std::error::Error>> {
        match &self.format {
            OutputFormat::Json | OutputFormat::Jsonl => self.write_record(&Record::Notice(notice)),
            OutputFormat::Console => self.write_output(&format!("{}\n", notice)),
        }
    }

    fn write_record(&mut self, record: &Record<'_>) -> Result<(), Box<dyn std::error::Error>> {
        let json = if self.format == OutputFormat::Json {
            serde_json::to_string_pretty(record)?
        } else {
            serde_json::to_string(record)?
        };
        self.write_output(&format!("{}\n", json))
    }

    fn write_output(&mut self, data: &str) -> Result<(), Box<dyn std::error::Error>> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", data);
                std::io::stdout().flush()?;
            }
        }
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

fn render_dashboard(view: &DashboardView) -> String {
    let mut out = format!(
        "[dashboard] requests: {}, failed: {}, active alerts: {}, blocked: {}, pending: {}\n",
        view.stats.total_requests,
        view.stats.failed_requests,
        view.stats.active_alerts,
        view.blocked_count,
        view.pending_mutations
    );
    if let Some(latest) = view.timeline.last() {
        out.push_str(&format!("  last minute: {} requests\n", latest.requests));
    }
    for endpoint in &view.top_endpoints {
        out.push_str(&format!("  {:>6}  {}\n", endpoint.count, endpoint.path));
    }
    for alert in &view.recent_alerts {
        out.push_str(&format!(
            "  #{} {} {} - {}{}\n",
            alert.id,
            alert.severity.as_str(),
            alert.source_ip,
            alert.reason,
            if alert.resolved { " (resolved)" } else { "" }
        ));
    }
    out
}
