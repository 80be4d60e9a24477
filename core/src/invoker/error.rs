use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Failed to launch synthesis process: {0}")]
    Launch(#[from] std::io::Error),

    /// The process started but collecting its exit status or output failed.
    #[error("Lost track of synthesis process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Speech generation took too long. Please try with shorter text.")]
    Timeout,

    #[error("Synthesis process failed (exit code {}): {}", exit_code_label(.exit_code), last_line(.stderr))]
    ProcessError {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Audio file was not generated")]
    MissingOutput,

    #[error("Synthesis interrupted: {0}")]
    Interrupted(String),
}

pub type InvokeResult<T> = Result<T, InvokeError>;

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

// Python tracebacks end with the actual exception line.
fn last_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::trim)
        .unwrap_or("")
}
