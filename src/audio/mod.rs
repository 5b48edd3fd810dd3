mod models;
mod analysis;
pub mod utils;

pub use models::{AudioData, ResampleQuality};
pub use analysis::{AudioAnalyzer, AudioAnalysis};
