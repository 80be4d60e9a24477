// Synthesis invoker: runs the external speech-synthesis program for one job

pub mod command;
pub mod error;
pub mod traits;

pub use command::{CommandConfig, CommandSynthesizer};
pub use error::{InvokeError, InvokeResult};
pub use traits::Synthesizer;

#[cfg(test)]
pub use traits::MockSynthesizer;
