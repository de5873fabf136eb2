//! JSON report writer.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::domain::error::WfsimError;
use crate::domain::walkforward::RunSummary;
use crate::ports::report_port::ReportPort;

/// Writes the whole run summary as one JSON document. Non-finite metrics
/// (an infinite profit factor, say) serialize as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportAdapter {
    pub compact: bool,
}

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, summary: &RunSummary) -> Result<String, WfsimError> {
        Ok(if self.compact {
            serde_json::to_string(summary)?
        } else {
            serde_json::to_string_pretty(summary)?
        })
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, summary: &RunSummary, output_path: &str) -> Result<(), WfsimError> {
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render(summary)?)?;
        info!(path = output_path, symbols = summary.reports.len(), "wrote report");
        Ok(())
    }
}
