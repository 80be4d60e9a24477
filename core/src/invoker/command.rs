//! External-command synthesizer.
//!
//! Runs the synthesis program once per job:
//!
//! ```text
//! <program> <script_args..> --sample_text <text> --language <lang> \
//!     --gender <gender> --alpha <alpha> --output_file <path>
//! ```
//!
//! inside `working_dir`, with stdout/stderr captured and a hard wall-clock
//! timeout. The child is spawned with `kill_on_drop`, so dropping an
//! in-flight invocation (timeout or abandonment by the dispatcher) also
//! terminates the process.

use super::error::{InvokeError, InvokeResult};
use super::traits::Synthesizer;
use crate::job::SynthesisJob;
use crate::request::SynthesisRequest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

#[derive(Clone, Debug)]
pub struct CommandConfig {
    /// Interpreter or binary to execute
    pub program: PathBuf,
    /// Arguments placed before the synthesis flags (e.g. the script name)
    pub script_args: Vec<String>,
    /// Working directory of the child process
    pub working_dir: PathBuf,
    /// Hard limit on a single invocation
    pub timeout: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python"),
            script_args: vec!["inference.py".to_string()],
            working_dir: PathBuf::from("Fastspeech2_HS"),
            timeout: Duration::from_secs(20),
        }
    }
}

pub struct CommandSynthesizer {
    cfg: CommandConfig,
}

impl CommandSynthesizer {
    pub fn new(cfg: CommandConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.cfg
    }

    /// Build the command line for one request.
    pub fn build_command(&self, request: &SynthesisRequest, output_path: &Path) -> Command {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.script_args);
        cmd.arg("--sample_text").arg(request.text());
        cmd.arg("--language").arg(request.language());
        cmd.arg("--gender").arg(request.gender());
        // Debug formatting keeps the decimal point ("1.0", not "1").
        cmd.arg("--alpha").arg(format!("{:?}", request.alpha()));
        cmd.arg("--output_file").arg(output_path);
        cmd
    }

    /// Run the synthesis program once and check its verdict.
    ///
    /// Succeeds only when the process exits zero within `limit` and
    /// `output_path` exists afterwards.
    pub async fn invoke(
        &self,
        request: &SynthesisRequest,
        output_path: &Path,
        working_dir: &Path,
        limit: Duration,
    ) -> InvokeResult<()> {
        let mut cmd = self.build_command(request, output_path);
        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(target: "invoker", command = ?cmd, "Running synthesis command");
        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| {
            error!(target: "invoker", program = ?self.cfg.program, error = %e, "Failed to spawn synthesis process");
            InvokeError::Launch(e)
        })?;

        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(target: "invoker", error = %e, "Failed to collect synthesis process output");
                return Err(InvokeError::Wait(e));
            }
            Err(_) => {
                error!(target: "invoker", timeout_ms = limit.as_millis() as u64, "Synthesis process timed out");
                return Err(InvokeError::Timeout);
            }
        };

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(
                target: "invoker",
                exit_code = ?output.status.code(),
                stdout = %stdout,
                stderr = %stderr,
                "Synthesis process failed"
            );
            return Err(InvokeError::ProcessError {
                exit_code: output.status.code(),
                stdout,
                stderr,
            });
        }

        if !tokio::fs::try_exists(output_path).await.unwrap_or(false) {
            error!(target: "invoker", path = ?output_path, "Output file was not generated");
            return Err(InvokeError::MissingOutput);
        }

        info!(
            target: "invoker",
            path = ?output_path,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synthesis finished"
        );
        Ok(())
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, job: &SynthesisJob) -> InvokeResult<()> {
        self.invoke(
            job.request(),
            job.output_path(),
            &self.cfg.working_dir,
            self.cfg.timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_carries_all_request_fields() {
        let synth = CommandSynthesizer::new(CommandConfig::default());
        let req = SynthesisRequest::new("नमस्ते दुनिया", "hindi", "male", Some(1.5)).unwrap();
        let cmd = synth.build_command(&req, Path::new("/tmp/out.wav"));
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "python");
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "inference.py",
                "--sample_text",
                "नमस्ते दुनिया",
                "--language",
                "hindi",
                "--gender",
                "male",
                "--alpha",
                "1.5",
                "--output_file",
                "/tmp/out.wav",
            ]
        );
    }
}
