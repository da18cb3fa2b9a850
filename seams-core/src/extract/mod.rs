//! History sources: where raw change records come from.

pub mod git;
pub mod log;
pub mod traits;

pub use git::GitHistorySource;
pub use log::LogHistorySource;
pub use traits::{HistorySource, PathFilter};
