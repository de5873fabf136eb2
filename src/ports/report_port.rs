//! Report output port trait.

use crate::domain::error::WfsimError;
use crate::domain::walkforward::RunSummary;

/// Port for handing finished runs to the reporting side.
pub trait ReportPort {
    fn write(&self, summary: &RunSummary, output_path: &str) -> Result<(), WfsimError>;
}
