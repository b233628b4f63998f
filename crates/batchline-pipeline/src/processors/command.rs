use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use batchline_core::{FileProcessor, ItemProgress, ProcessError, ProcessRequest, ProgressSink};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::{StagedOutput, destination_exists};
use crate::error::{PipelineError, PipelineResult};

/// Argument token replaced with the item's source path.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Argument token replaced with the path the command should write.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

const STDERR_TAIL_LINES: usize = 5;

/// Non-zero exit from the external command.
#[derive(Debug, Error)]
#[error("command exited with {status}: {stderr}")]
pub struct CommandExit {
    /// Exit status reported by the operating system.
    pub status: ExitStatus,
    /// Last lines written to stderr.
    pub stderr: String,
}

/// Runs an external program once per item.
///
/// Arguments may contain [`INPUT_PLACEHOLDER`] and [`OUTPUT_PLACEHOLDER`].
/// `{output}` points at a scratch path beside the destination; the result is
/// moved over the destination only after the command exits successfully, so a
/// failed or cancelled run leaves any existing file intact. An existing
/// destination is reported as a conflict unless overwriting. The child is
/// killed when the batch is cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandProcessor {
    /// Processor running `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace-separated template such as `ffmpeg -y -i {input} {output}`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] when the template is empty or
    /// never mentions [`OUTPUT_PLACEHOLDER`].
    pub fn from_template(template: &str) -> PipelineResult<Self> {
        let mut parts = template.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(PipelineError::InvalidInput {
                field: "command",
                reason: "command template is empty",
                value: None,
            });
        };
        let args: Vec<&str> = parts.collect();
        if !args.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
            return Err(PipelineError::InvalidInput {
                field: "command",
                reason: "command template must reference {output}",
                value: Some(template.to_string()),
            });
        }
        Ok(Self::new(program, args))
    }

    /// Program that will be executed.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.as_os_str().to_os_string(),
                OUTPUT_PLACEHOLDER => output.as_os_str().to_os_string(),
                other => OsString::from(
                    other
                        .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                        .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy()),
                ),
            })
            .collect()
    }
}

#[async_trait]
impl FileProcessor for CommandProcessor {
    async fn process(
        &self,
        request: &ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> Result<(), ProcessError> {
        let destination = &request.destination;
        let overwrite = request.options.overwrite;
        if !overwrite && destination_exists("command.stat_destination", destination).await? {
            return Err(ProcessError::DestinationExists {
                path: destination.clone(),
            });
        }
        let staged = StagedOutput::reserve(destination).await?;

        let args = self.render_args(&request.source, staged.path());
        debug!(program = %self.program, ?args, "spawning command");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ProcessError::failed("command.spawn", &request.source, err))?;
        progress.report(
            request.item_id,
            ItemProgress::status(format!("running {}", self.program)),
        );

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|err| ProcessError::failed("command.wait", &request.source, err))?
            }
            () = request.cancel.cancelled() => return Err(ProcessError::Cancelled),
        };

        if !output.status.success() {
            return Err(ProcessError::failed(
                "command.exit",
                &request.source,
                CommandExit {
                    status: output.status,
                    stderr: stderr_tail(&output.stderr),
                },
            ));
        }
        staged.commit(overwrite).await?;
        progress.report(request.item_id, ItemProgress::fraction(1.0));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
