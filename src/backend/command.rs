//! Subprocess backend
//!
//! Spawns the configured program once per call, writes a JSON request
//! `{"text": ..., "image": ...}` to its stdin and takes its stdout as the
//! response. The child is killed if the call is dropped (timeout or
//! cancellation).

use super::{ImageRef, IntelligenceBackend, LlmProcessingError};
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried into an error
const STDERR_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Serialize)]
struct Request<'a> {
    text: &'a str,
    image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    vision: bool,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            vision: false,
        }
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }
}

#[async_trait]
impl IntelligenceBackend for CommandBackend {
    fn id(&self) -> &str {
        &self.program
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn process(
        &self,
        text: &str,
        image: Option<&ImageRef>,
    ) -> Result<String, LlmProcessingError> {
        let request = Request {
            text,
            image: image
                .filter(|_| self.vision)
                .map(|i| i.path().display().to_string()),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| LlmProcessingError::InvocationFailed(format!("request encoding: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                LlmProcessingError::Unavailable(format!("failed to start {}: {}", self.program, e))
            })?;

        // stdin is fed while stdout drains
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&payload).await?;
                // closing stdin signals end of request
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await.map_err(|e| {
            LlmProcessingError::InvocationFailed(format!("failed to read response: {}", e))
        })?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // the child may exit without reading the whole request
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(LlmProcessingError::InvocationFailed(format!(
                        "failed to write request: {}",
                        e
                    )))
                }
                Err(e) => {
                    return Err(LlmProcessingError::InvocationFailed(format!(
                        "request writer failed: {}",
                        e
                    )))
                }
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect();
            return Err(LlmProcessingError::InvocationFailed(format!(
                "{} exited with {}: {}",
                self.program, output.status, excerpt
            )));
        }

        debug!(program = %self.program, bytes = output.stdout.len(), "backend responded");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_request_through_cat() {
        let backend = CommandBackend::new("cat", vec![]);
        let image = ImageRef::new("/tmp/p1.png");
        let reply = backend.process("hello", Some(&image)).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["text"], "hello");
        // no vision: the image is withheld
        assert!(value["image"].is_null());
    }

    #[tokio::test]
    async fn vision_backend_receives_image_path() {
        let backend = CommandBackend::new("cat", vec![]).with_vision(true);
        let image = ImageRef::new("/tmp/p1.png");
        let reply = backend.process("hello", Some(&image)).await.unwrap();
        assert!(reply.contains("/tmp/p1.png"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let backend = CommandBackend::new(
            "sh",
            vec!["-c".into(), "cat >/dev/null; echo boom >&2; exit 3".into()],
        );
        let err = backend.process("x", None).await.unwrap_err();
        match err {
            LlmProcessingError::InvocationFailed(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_reply_before_reading_request_does_not_stall() {
        // writes more than a pipe buffer before touching stdin
        let backend = CommandBackend::new(
            "sh",
            vec![
                "-c".into(),
                "head -c 200000 /dev/zero | tr '\\0' a; cat >/dev/null".into(),
            ],
        );
        let request = "b".repeat(200_000);
        let reply = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            backend.process(&request, None),
        )
        .await
        .expect("request and reply are piped concurrently")
        .unwrap();
        assert_eq!(reply.len(), 200_000);
        assert!(reply.chars().all(|c| c == 'a'));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let backend = CommandBackend::new("/nonexistent/docgraph-backend", vec![]);
        let err = backend.process("x", None).await.unwrap_err();
        assert!(matches!(err, LlmProcessingError::Unavailable(_)));
    }
}
