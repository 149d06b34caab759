//! Document conversion through the external `pandoc` tool.
//!
//! Conversion is a one-shot child process: stdout and stderr are read
//! concurrently (to avoid pipe deadlock) and the whole run is bounded by a
//! timeout. Markdown on stdout is returned whole or not at all: output past
//! [`MAX_OUTPUT`] fails the conversion. Only stderr is truncated. The child is spawned with
//! `kill_on_drop(true)` so a timed-out or cancelled conversion does not
//! linger.

use std::fmt::Write;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Max bytes of Markdown, and of stderr kept for error reports (16 MB).
const MAX_OUTPUT: usize = 16 * 1024 * 1024;

/// Flags passed on every conversion.
pub const DEFAULT_ARGS: [&str; 2] = ["--standalone", "--columns=80"];

/// One `.docx` → Markdown conversion.
#[derive(Debug, Clone)]
pub struct DocxToMarkdown {
    pub input: PathBuf,
    /// Write Markdown here instead of returning it.
    pub output: Option<PathBuf>,
    /// Extract embedded images into this directory.
    pub extract_media: Option<PathBuf>,
}

impl DocxToMarkdown {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            extract_media: None,
        }
    }

    /// Command-line arguments for pandoc.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--from=docx".to_string(),
            "--to=markdown".to_string(),
        ];
        args.extend(DEFAULT_ARGS.iter().map(ToString::to_string));
        if let Some(ref dir) = self.extract_media {
            args.push("--extract-media".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        if let Some(ref out) = self.output {
            args.push("--output".to_string());
            args.push(out.to_string_lossy().into_owned());
        }
        args.push(self.input.to_string_lossy().into_owned());
        args
    }

    /// Run the conversion. Returns the Markdown text, or an empty string when
    /// `output` was set and pandoc wrote the file itself.
    pub async fn run(&self, pandoc: &str, timeout_ms: u64) -> Result<String, ConvertError> {
        if !self.input.is_file() {
            return Err(ConvertError::InputMissing(self.input.clone()));
        }
        info!("Converting {} to Markdown", self.input.display());
        let args = self.args();
        debug!("{pandoc} {}", args.join(" "));

        let mut child = Command::new(pandoc)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::SpawnFailed(format!("{pandoc}: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConvertError::ProcessFailed("Failed to take stdout pipe".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConvertError::ProcessFailed("Failed to take stderr pipe".to_string()))?;

        let timeout = tokio::time::Duration::from_millis(timeout_ms);
        let (status, out, err) = tokio::time::timeout(timeout, async {
            let (out, err) = tokio::join!(
                read_limited(&mut stdout, MAX_OUTPUT),
                read_capped(&mut stderr, MAX_OUTPUT),
            );
            drop(stdout);
            drop(stderr);
            let status = child
                .wait()
                .await
                .map_err(|e| ConvertError::ProcessFailed(e.to_string()))?;
            Ok::<_, ConvertError>((status, out, err))
        })
        .await
        .map_err(|_| ConvertError::Timeout)??;

        if !status.success() {
            return Err(ConvertError::Failed {
                exit_code: status.code().unwrap_or(-1),
                stderr: err.trim().to_string(),
            });
        }
        String::from_utf8(out?)
            .map_err(|_| ConvertError::ProcessFailed("pandoc output is not valid UTF-8".to_string()))
    }
}

/// Read a stream in full, failing once it exceeds `max_bytes`. The stream is
/// still drained after the limit so the child can exit.
async fn read_limited(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    max_bytes: usize,
) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::with_capacity(max_bytes.min(65536));
    let mut tmp = [0u8; 8192];
    let mut total_read = 0usize;
    loop {
        let n = reader
            .read(&mut tmp)
            .await
            .map_err(|e| ConvertError::ProcessFailed(e.to_string()))?;
        if n == 0 {
            break;
        }
        total_read += n;
        if total_read <= max_bytes {
            buf.extend_from_slice(&tmp[..n]);
        }
    }
    if total_read > max_bytes {
        return Err(ConvertError::OutputTooLarge {
            size: total_read,
            limit: max_bytes,
        });
    }
    Ok(buf)
}

/// Read from an async reader, keeping the first `max_bytes` and discarding the
/// rest. Reading continues past the cap so the child never blocks on a full
/// pipe.
async fn read_capped(reader: &mut (impl tokio::io::AsyncRead + Unpin), max_bytes: usize) -> String {
    let mut buf = Vec::with_capacity(max_bytes.min(65536));
    let mut tmp = [0u8; 8192];
    let mut total_read = 0usize;
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                total_read += n;
                if buf.len() < max_bytes {
                    let take = n.min(max_bytes - buf.len());
                    buf.extend_from_slice(&tmp[..take]);
                }
            }
        }
    }
    let mut s = String::from_utf8_lossy(&buf).into_owned();
    if total_read > max_bytes {
        let _ = write!(
            s,
            "\n[truncated: {total_read} bytes total, showing first {max_bytes}]"
        );
    }
    s
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Input file not found: {}", .0.display())]
    InputMissing(PathBuf),
    /// pandoc could not be started (not installed, not executable).
    #[error("Failed to spawn pandoc: {0}")]
    SpawnFailed(String),
    #[error("Process error: {0}")]
    ProcessFailed(String),
    #[error("Conversion timed out")]
    Timeout,
    #[error("Converted document is {size} bytes, over the {limit} byte limit")]
    OutputTooLarge { size: usize, limit: usize },
    /// pandoc ran and rejected the input.
    #[error("Invalid document (pandoc exit {exit_code}): {stderr}")]
    Failed { exit_code: i32, stderr: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_minimal() {
        let job = DocxToMarkdown::new("/tmp/in.docx");
        assert_eq!(
            job.args(),
            [
                "--from=docx",
                "--to=markdown",
                "--standalone",
                "--columns=80",
                "/tmp/in.docx"
            ]
        );
    }

    #[test]
    fn test_args_with_output_and_media() {
        let job = DocxToMarkdown {
            input: "in.docx".into(),
            output: Some("out.md".into()),
            extract_media: Some("media".into()),
        };
        let args = job.args();
        assert_eq!(args.last().map(String::as_str), Some("in.docx"));
        let pos = args.iter().position(|a| a == "--extract-media").unwrap();
        assert_eq!(args[pos + 1], "media");
        let pos = args.iter().position(|a| a == "--output").unwrap();
        assert_eq!(args[pos + 1], "out.md");
    }

    #[tokio::test]
    async fn test_missing_input() {
        let err = DocxToMarkdown::new("/definitely/not/here.docx")
            .run("pandoc", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::InputMissing(_)));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let input = tempfile::NamedTempFile::new().unwrap();
        let err = DocxToMarkdown::new(input.path())
            .run("/nonexistent/pandoc-binary", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_read_capped_truncates() {
        let data = vec![b'x'; 100];
        let mut reader = &data[..];
        let s = read_capped(&mut reader, 10).await;
        assert!(s.starts_with("xxxxxxxxxx\n[truncated: 100 bytes total"));
    }

    #[tokio::test]
    async fn test_read_limited_keeps_everything_up_to_limit() {
        let data = "é".repeat(50).into_bytes();
        let mut reader = &data[..];
        let out = read_limited(&mut reader, data.len()).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_read_limited_rejects_oversized_output() {
        let data = vec![b'x'; 100];
        let mut reader = &data[..];
        let err = read_limited(&mut reader, 10).await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::OutputTooLarge {
                size: 100,
                limit: 10
            }
        ));
    }

    /// A converter that prints more than [`MAX_OUTPUT`] bytes must fail rather
    /// than return cut-off Markdown.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_oversized_markdown_fails_conversion() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-pandoc");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nhead -c {} /dev/zero | tr '\\0' 'a'\n",
                MAX_OUTPUT + 1
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let input = tempfile::NamedTempFile::new().unwrap();

        let err = DocxToMarkdown::new(input.path())
            .run(script.to_str().unwrap(), 30_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::OutputTooLarge { limit: MAX_OUTPUT, .. }));
    }
}
