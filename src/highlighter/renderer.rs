use std::future::Future;
use std::io;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::RenderError;

/// Turns snippet source into highlighted markup.
pub trait Renderer: Send + Sync + 'static {
    fn render(
        &self,
        contents: &str,
        language: &str,
    ) -> impl Future<Output = Result<String, RenderError>> + Send;
}

/// Runs `pygmentize -l <language> -f html`, feeding the snippet on stdin.
#[derive(Debug, Clone)]
pub struct PygmentsRenderer {
    command: String,
}

impl Default for PygmentsRenderer {
    fn default() -> Self {
        Self::new("pygmentize")
    }
}

impl PygmentsRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Renderer for PygmentsRenderer {
    async fn render(&self, contents: &str, language: &str) -> Result<String, RenderError> {
        let mut child = Command::new(&self.command)
            .args(["-l", language, "-f", "html"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RenderError::Spawn)?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(contents.as_bytes()).await?;
            }
            Ok::<_, io::Error>(())
        };

        // stdin is written while stdout drains, so large snippets cannot fill both pipes
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if let Err(e) = fed {
            // a renderer that exits early closes its stdin; its exit status says why
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}
