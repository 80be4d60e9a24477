use super::error::InvokeResult;
use crate::job::SynthesisJob;
use async_trait::async_trait;

/// Produces the audio file for a job.
///
/// Implementations make a single attempt: success means the file at
/// `job.output_path()` exists. No retries, no partial output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, job: &SynthesisJob) -> InvokeResult<()>;
}
