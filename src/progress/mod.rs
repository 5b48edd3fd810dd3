mod tracker;
mod cancel;

pub use tracker::{ProgressTracker, ProgressCallback, ChildProgressTracker};
pub use cancel::CancellationToken;
