//! FFmpeg command builder and process helpers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Placeholder path meaning "stdin" for inputs and "stdout" for outputs.
pub const PIPE: &str = "-";

/// Lines of FFmpeg stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or [`PIPE`]
    input: PathBuf,
    /// Output file path or [`PIPE`]
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Declare a raw RGB24 stream of `width`x`height` frames at `fps`.
    pub fn raw_rgb_input(self, width: u32, height: u32, fps: f64) -> Self {
        self.input_arg("-f")
            .input_arg("rawvideo")
            .input_arg("-pix_fmt")
            .input_arg("rgb24")
            .input_arg("-s")
            .input_arg(format!("{}x{}", width, height))
            .input_arg("-r")
            .input_arg(format_fps(fps))
    }

    /// Emit raw RGB24 frames.
    pub fn raw_rgb_output(self) -> Self {
        self.output_arg("-pix_fmt")
            .output_arg("rgb24")
            .output_arg("-f")
            .output_arg("rawvideo")
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Force the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Drop audio streams.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string()];

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }

    /// Spawn FFmpeg with piped stdio. The child is killed when dropped.
    pub fn spawn(&self) -> MediaResult<Child> {
        let ffmpeg = check_ffmpeg()?;
        let args = self.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let stdin = if self.input == Path::new(PIPE) {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let child = Command::new(ffmpeg)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }
}

/// Format a frame rate for FFmpeg (`30`, `29.970030`).
pub fn format_fps(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-9 {
        format!("{}", fps.round() as i64)
    } else {
        format!("{:.6}", fps)
    }
}

/// Drain a child's stderr in the background, keeping the last lines.
///
/// FFmpeg blocks once its stderr pipe fills, so the pipe must always be read.
pub fn collect_stderr_tail<R>(stderr: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    })
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Check whether the local FFmpeg build ships an encoder (e.g. `libvpx`).
pub async fn has_encoder(name: &str) -> MediaResult<bool> {
    let ffmpeg = check_ffmpeg()?;
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            "ffmpeg -encoders failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }
    let listing = String::from_utf8_lossy(&output.stdout);
    Ok(encoder_listed(&listing, name))
}

fn encoder_listed(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|encoder| encoder == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_command_args() {
        let cmd = FfmpegCommand::new("original.webm", PIPE)
            .video_filter("fps=30,scale=320:240")
            .raw_rgb_output();

        let args = cmd.build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "original.webm");
        assert!(args.contains(&"rawvideo".to_string()));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn test_encode_command_puts_raw_args_before_input() {
        let cmd = FfmpegCommand::new(PIPE, "heatmap.webm.part")
            .raw_rgb_input(320, 240, 30.0)
            .video_codec("libvpx")
            .format("webm");

        let args = cmd.build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        let size = args.iter().position(|a| a == "320x240").unwrap();
        let codec = args.iter().position(|a| a == "libvpx").unwrap();
        assert!(size < i);
        assert!(codec > i);
        assert_eq!(args[i + 1], "-");
        assert_eq!(args.last().unwrap(), "heatmap.webm.part");
    }

    #[test]
    fn test_format_fps() {
        assert_eq!(format_fps(30.0), "30");
        assert_eq!(format_fps(30000.0 / 1001.0), "29.970030");
    }

    #[test]
    fn test_encoder_listed() {
        let listing = " V....D libvpx               libvpx VP8 (codec vp8)\n V....D libx264  H.264\n";
        assert!(encoder_listed(listing, "libvpx"));
        assert!(!encoder_listed(listing, "libvpx-vp9"));
    }

    #[tokio::test]
    async fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = collect_stderr_tail(std::io::Cursor::new(text.into_bytes()))
            .await
            .unwrap();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 10");
        assert_eq!(*lines.last().unwrap(), "line 29");
    }
}
