//! Check result data model.
//!
//! Types that mirror the check files written by the external checker, plus
//! the statistics derived from them.

mod result;
mod stats;
mod status;

pub use result::*;
pub use stats::*;
pub use status::*;
