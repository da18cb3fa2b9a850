pub mod normalize;
pub mod rename;

pub use normalize::{NormalizeOutcome, Timeline, normalize};
pub use rename::RenameIndex;
