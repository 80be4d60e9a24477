use crate::invoker::InvokeError;
use crate::request::SynthesisRequest;
use crate::{Result, SpeechError};
use std::path::{Path, PathBuf};

/// One accepted request bound to the file it must produce.
///
/// Owned by the dispatcher from `submit` until its outcome is delivered.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    request: SynthesisRequest,
    output_path: PathBuf,
}

impl SynthesisJob {
    pub fn new(request: SynthesisRequest, output_path: impl Into<PathBuf>) -> Result<Self> {
        let output_path = output_path.into();
        if !output_path.is_absolute() {
            return Err(SpeechError::InvalidJob(format!(
                "output path must be absolute: {}",
                output_path.display()
            )));
        }
        Ok(Self {
            request,
            output_path,
        })
    }

    pub fn request(&self) -> &SynthesisRequest {
        &self.request
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Terminal result of a job, produced exactly once.
#[derive(Debug)]
pub enum JobOutcome {
    Success { audio_path: PathBuf },
    Failure(InvokeError),
    TimedOut,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobOutcome::Success { .. } => "success",
            JobOutcome::Failure(_) => "failure",
            JobOutcome::TimedOut => "timed_out",
        }
    }
}
