// Speechgate Core Library
// Bounded text-to-speech job dispatch in front of an external synthesis command

pub mod dispatcher;
pub mod invoker;
pub mod janitor;
pub mod job;
pub mod request;

// Export core types
pub use dispatcher::{DispatcherConfig, DispatcherStats, JobDispatcher, JobHandle};
pub use invoker::{CommandConfig, CommandSynthesizer, InvokeError, Synthesizer};
pub use janitor::{CleanupError, CleanupReport};
pub use job::{JobOutcome, SynthesisJob};
pub use request::{output_filename, SynthesisRequest, ValidationError, MAX_TEXT_CHARS};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
pub type Result<T> = std::result::Result<T, SpeechError>;

/// Seconds since the UNIX epoch, used to stamp output filenames.
#[inline]
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
