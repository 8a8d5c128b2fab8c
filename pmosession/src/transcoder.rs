//! External transcoder turning a remote stream into receiver-ready bytes

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Byte stream produced by a transcoder
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Opens a remote audio URL as a readable byte stream
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn open(&self, url: &str) -> Result<ByteSource>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderSettings {
    pub ffmpeg_path: String,
    /// Value of ffmpeg's `-rtbufsize`
    pub rtbufsize: String,
    /// Container handed to `-f`
    pub output_format: String,
}

impl Default for TranscoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            rtbufsize: "25M".to_string(),
            output_format: "mp3".to_string(),
        }
    }
}

/// Runs `ffmpeg -rtbufsize <buf> -i <url> -f <fmt> -` and reads its stdout
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    settings: TranscoderSettings,
}

impl FfmpegTranscoder {
    pub fn new(settings: TranscoderSettings) -> Self {
        Self { settings }
    }

    pub fn command_args(&self, url: &str) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-rtbufsize".to_string(),
            self.settings.rtbufsize.clone(),
            "-i".to_string(),
            url.to_string(),
            "-f".to_string(),
            self.settings.output_format.clone(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn open(&self, url: &str) -> Result<ByteSource> {
        let args = self.command_args(url);
        debug!(program = %self.settings.ffmpeg_path, ?args, "Spawning transcoder");

        let mut child = Command::new(&self.settings.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::transcoder(format!(
                    "cannot start {}: {}",
                    self.settings.ffmpeg_path, e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transcoder("transcoder stdout was not captured"))?;

        info!(url, pid = child.id(), "Transcoder started");
        Ok(Box::new(TranscodedStream::new(
            self.settings.ffmpeg_path.clone(),
            child,
            stdout,
        )))
    }
}

type ExitFuture = Pin<Box<dyn Future<Output = io::Result<ExitStatus>> + Send>>;

/// Keeps the child alive as long as its output is read; dropping it kills the process
///
/// End of output is only reported once the process has been reaped: a
/// non-zero exit status turns into a read error.
struct TranscodedStream {
    program: String,
    child: Option<Child>,
    stdout: ChildStdout,
    exit: Option<ExitFuture>,
    failure: Option<String>,
}

impl TranscodedStream {
    fn new(program: String, child: Child, stdout: ChildStdout) -> Self {
        Self {
            program,
            child: Some(child),
            stdout,
            exit: None,
            failure: None,
        }
    }
}

impl AsyncRead for TranscodedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if let Some(reason) = &this.failure {
                return Poll::Ready(Err(io::Error::other(reason.clone())));
            }

            if let Some(exit) = this.exit.as_mut() {
                let status = ready!(exit.as_mut().poll(cx));
                this.exit = None;
                match status {
                    Ok(status) if status.success() => {
                        debug!(program = %this.program, "Transcoder finished");
                        return Poll::Ready(Ok(()));
                    }
                    Ok(status) => {
                        let reason = format!("{} exited with {}", this.program, status);
                        warn!(%reason, "Transcoder failed");
                        this.failure = Some(reason);
                    }
                    Err(err) => {
                        this.failure = Some(format!("cannot reap {}: {}", this.program, err));
                    }
                }
                continue;
            }

            let before = buf.filled().len();
            ready!(Pin::new(&mut this.stdout).poll_read(cx, buf))?;
            if buf.filled().len() > before || buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            // Output closed: wait for the exit status before reporting EOF
            match this.child.take() {
                Some(mut child) => {
                    this.exit = Some(Box::pin(async move { child.wait().await }));
                }
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}
