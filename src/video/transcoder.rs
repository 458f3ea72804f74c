//! External transcoder subprocess

use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::config::TranscoderConfig;
use crate::types::FrameGeometry;
use crate::{DroneError, Result};

/// Handle on the running transcoder. The process is killed when this is dropped.
#[derive(Debug)]
pub struct Transcoder {
    child: Child,
    program: String,
}

impl Transcoder {
    /// Launch the transcoder with piped stdin/stdout.
    ///
    /// Returns the handle together with the pipe ends: compressed video goes into
    /// the `ChildStdin`, raw frames come out of the `ChildStdout`.
    pub fn spawn(
        config: &TranscoderConfig,
        geometry: FrameGeometry,
    ) -> Result<(Self, ChildStdin, ChildStdout)> {
        let program = config.program.clone();
        let args = config.resolved_args(geometry);
        debug!(program = %program, args = ?args, "Launching transcoder");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DroneError::Transcoder { program: program.clone(), source })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(DroneError::Transcoder {
                program,
                source: std::io::Error::other("transcoder pipes were not captured"),
            });
        };

        info!(program = %program, pid = ?child.id(), "Transcoder started");
        Ok((Self { child, program }, stdin, stdout))
    }

    /// OS process id, or `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the process has already exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Force-terminate the process and reap it.
    pub async fn kill(&mut self) {
        match self.child.kill().await {
            Ok(()) => info!(program = %self.program, "Transcoder terminated"),
            Err(e) => debug!(program = %self.program, "Transcoder already gone: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn cat() -> TranscoderConfig {
        TranscoderConfig { program: "cat".to_string(), args: Some(vec![]), input_args: vec![] }
    }

    #[tokio::test]
    async fn pipes_connect_to_the_process() {
        let (mut transcoder, mut stdin, mut stdout) =
            Transcoder::spawn(&cat(), FrameGeometry::new(2, 2)).unwrap();
        assert!(transcoder.id().is_some());

        stdin.write_all(b"frame").await.unwrap();
        stdin.flush().await.unwrap();
        let mut echoed = [0u8; 5];
        stdout.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"frame");

        transcoder.kill().await;
        assert!(transcoder.has_exited());
    }

    #[tokio::test]
    async fn kill_twice_is_harmless() {
        let (mut transcoder, _stdin, _stdout) =
            Transcoder::spawn(&cat(), FrameGeometry::new(2, 2)).unwrap();
        transcoder.kill().await;
        transcoder.kill().await;
        assert_eq!(transcoder.program(), "cat");
    }

    #[tokio::test]
    async fn missing_program_is_a_transcoder_error() {
        let config = TranscoderConfig {
            program: "/nonexistent/flightdeck-transcoder".to_string(),
            ..cat()
        };
        let err = Transcoder::spawn(&config, FrameGeometry::new(2, 2)).unwrap_err();
        assert!(matches!(err, DroneError::Transcoder { .. }));
        assert!(!err.is_retryable());
    }
}
