use crate::error::SourceError;
use ipt_core::SourceConfig;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Runs the rule listing tool and hands back its stdout
#[derive(Debug, Clone)]
pub struct SaveCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl SaveCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Capture one dump. The child is killed if the timeout expires.
    pub async fn capture(&self) -> Result<String, SourceError> {
        debug!("Running {} {}", self.program, self.args.join(" "));

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(SourceError::Timeout {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(SourceError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| SourceError::InvalidUtf8 {
            program: self.program.clone(),
        })
    }
}

impl Default for SaveCommand {
    fn default() -> Self {
        Self::from_config(&SourceConfig::default())
    }
}
