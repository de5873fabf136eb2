//! Bar source port trait.

use crate::domain::bar::BarFrame;
use crate::domain::error::WfsimError;
use crate::domain::range::TimeRange;

pub trait DataPort {
    /// Bars for `symbol`, restricted to `range` when given. Implementations
    /// must return bars in strictly increasing date order or fail with a
    /// data error.
    fn fetch_bars(&self, symbol: &str, range: Option<TimeRange>) -> Result<BarFrame, WfsimError>;

    fn list_symbols(&self) -> Result<Vec<String>, WfsimError>;
}
