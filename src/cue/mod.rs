mod models;

pub use models::{Cue, format_srt_timestamp, preview_text};
