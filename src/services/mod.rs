//! Service layer for separating concerns
//!
//! Progress reporting and file I/O live here so the pipeline itself stays free of
//! frontend and filesystem details.

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate, RecordingProgressReporter,
};
