//! Video encoding via FFmpeg (ffmpeg-sidecar).
//!
//! Frames are piped to an ffmpeg child process as raw RGB24 on stdin
//! and encoded to H.264 in an MP4 container. The child is spawned once
//! per recording and finalized exactly once by [`VideoEncoder::finish`].

use crate::capture::Frame;
use chrono::{DateTime, Local};
use directories::UserDirs;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Error type for encoder operations.
#[derive(Debug)]
pub enum EncoderError {
    /// The output directory could not be resolved or created
    OutputDir(String),
    /// Frame dimensions unusable by the codec
    InvalidDimensions(u32, u32),
    /// The ffmpeg process could not be started
    Spawn(String),
    /// The ffmpeg stdin pipe was unavailable
    Pipe,
    /// Writing a frame to ffmpeg failed
    Write(String),
    /// ffmpeg exited with an error while finalizing
    Exit(String),
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderError::OutputDir(msg) => write!(f, "output directory error: {}", msg),
            EncoderError::InvalidDimensions(w, h) => {
                write!(f, "invalid frame dimensions: {}x{}", w, h)
            }
            EncoderError::Spawn(msg) => write!(f, "failed to start ffmpeg: {}", msg),
            EncoderError::Pipe => write!(f, "ffmpeg stdin unavailable"),
            EncoderError::Write(msg) => write!(f, "failed to write frame: {}", msg),
            EncoderError::Exit(msg) => write!(f, "ffmpeg failed: {}", msg),
        }
    }
}

impl std::error::Error for EncoderError {}

/// An ordered sink of frames requiring an explicit close to finalize.
pub trait FrameSink {
    /// Append one frame to the stream. A failure here is fatal for the
    /// recording; the sink must still be finished afterwards.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError>;

    /// Finalize the stream. Consumes the sink, so it can only happen once.
    fn finish(self) -> Result<(), EncoderError>;
}

/// Resolve the ffmpeg binary: system PATH first, then the sidecar
/// location next to the executable.
fn resolve_ffmpeg_path() -> PathBuf {
    which::which("ffmpeg").unwrap_or_else(|_| ffmpeg_sidecar::paths::ffmpeg_path())
}

/// Verify ffmpeg is runnable. Should be called once before recording.
///
/// Falls back to ffmpeg-sidecar's auto-download when no usable binary
/// is found.
pub fn ensure_ffmpeg() -> Result<(), EncoderError> {
    let ffmpeg = resolve_ffmpeg_path();
    let probe = Command::new(&ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match probe {
        Ok(status) if status.success() => {
            tracing::debug!("ffmpeg verified at {}", ffmpeg.display());
            Ok(())
        }
        Ok(status) => Err(EncoderError::Spawn(format!(
            "ffmpeg at {} exited with status {}",
            ffmpeg.display(),
            status
        ))),
        Err(_) => {
            tracing::info!("ffmpeg not found, attempting download");
            ffmpeg_sidecar::download::auto_download()
                .map_err(|e| EncoderError::Spawn(format!("ffmpeg unavailable: {}", e)))
        }
    }
}

/// Detect the best available H.264 encoder by probing `ffmpeg -encoders`.
fn detect_h264_encoder() -> &'static str {
    let output = Command::new(resolve_ffmpeg_path())
        .args(["-encoders", "-hide_banner"])
        .output();

    let listing = match output {
        Ok(o) => String::from_utf8_lossy(&o.stdout).to_string(),
        Err(e) => {
            tracing::warn!("could not probe ffmpeg encoders: {}", e);
            String::new()
        }
    };

    // libx264 is preferred; hardware encoders cover distros shipping
    // ffmpeg without it (e.g. Fedora's ffmpeg-free).
    const PREFERENCES: [&str; 4] = ["libx264", "libopenh264", "h264_vaapi", "h264_nvenc"];
    for name in PREFERENCES {
        if listing.lines().any(|l| l.contains(name)) {
            tracing::debug!("using H.264 encoder: {}", name);
            return name;
        }
    }

    tracing::warn!("no H.264 encoder detected, trying libx264 anyway");
    "libx264"
}

/// Video encoder that pipes raw frames into ffmpeg.
pub struct VideoEncoder {
    stdin: Option<ChildStdin>,
    child: Option<Child>,
    output_path: PathBuf,
    width: u32,
    height: u32,
}

impl VideoEncoder {
    /// Spawn the ffmpeg process for a stream of `width`x`height` frames
    /// at `fps`. Dimensions are rounded down to even numbers for codec
    /// compatibility; incoming frames may be slightly larger and are
    /// cropped on write.
    pub fn open(
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, EncoderError> {
        let (width, height) = even_dimensions(width, height);
        if width == 0 || height == 0 {
            return Err(EncoderError::InvalidDimensions(width, height));
        }

        let encoder = detect_h264_encoder();

        let mut command = FfmpegCommand::new_with_path(resolve_ffmpeg_path());
        command
            // Input: raw frames on stdin
            .args(["-f", "rawvideo"])
            .args(["-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &fps.to_string()])
            .args(["-i", "-"])
            // Output: H.264 in MP4
            .args(["-c:v", encoder]);

        match encoder {
            "libx264" => {
                command
                    .args(["-preset", "ultrafast"])
                    .args(["-crf", "23"]);
            }
            "libopenh264" => {
                command.args(["-b:v", "2M"]);
            }
            "h264_vaapi" => {
                command.args(["-qp", "23"]);
            }
            "h264_nvenc" => {
                command
                    .args(["-preset", "p1"])
                    .args(["-rc", "vbr"])
                    .args(["-cq", "23"]);
            }
            _ => {}
        }

        command
            .args(["-pix_fmt", "yuv420p"])
            .args(["-movflags", "+faststart"])
            .args(["-y"])
            .arg(output_path.to_string_lossy().to_string());

        let inner = command.as_inner_mut();
        inner.stdin(Stdio::piped());
        inner.stdout(Stdio::null());
        inner.stderr(Stdio::piped());

        let mut child = inner.spawn().map_err(|e| EncoderError::Spawn(e.to_string()))?;
        let stdin = child.stdin.take().ok_or(EncoderError::Pipe)?;

        // Drain ffmpeg's stderr so the child never blocks on it.
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || {
                use std::io::{BufRead, BufReader};
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    tracing::debug!(target: "ffmpeg", "{}", line);
                }
            });
        }

        Ok(Self {
            stdin: Some(stdin),
            child: Some(child),
            output_path: output_path.to_path_buf(),
            width,
            height,
        })
    }

    /// Path of the file being written.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl FrameSink for VideoEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError> {
        let stdin = self.stdin.as_mut().ok_or(EncoderError::Pipe)?;

        if frame.width == self.width && frame.height == self.height {
            return stdin
                .write_all(&frame.data)
                .map_err(|e| EncoderError::Write(e.to_string()));
        }

        // Frames can exceed encoder dimensions after even rounding.
        match crop_to(frame, self.width, self.height) {
            Some(data) => stdin
                .write_all(&data)
                .map_err(|e| EncoderError::Write(e.to_string())),
            None => {
                tracing::warn!(
                    "skipping {}x{} frame smaller than encoder {}x{}",
                    frame.width,
                    frame.height,
                    self.width,
                    self.height
                );
                Ok(())
            }
        }
    }

    fn finish(mut self) -> Result<(), EncoderError> {
        // Closing stdin signals end of input.
        drop(self.stdin.take());

        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| EncoderError::Exit(e.to_string()))?;
            if !status.success() {
                return Err(EncoderError::Exit(format!(
                    "exit code {:?}",
                    status.code()
                )));
            }
        }

        tracing::info!("finalized {}", self.output_path.display());
        Ok(())
    }
}

/// Round dimensions down to even values, as H.264 yuv420p requires.
fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width & !1, height & !1)
}

/// Extract the top-left `width`x`height` sub-rectangle of an RGB24
/// frame. Returns `None` when the frame is smaller than requested.
fn crop_to(frame: &Frame, width: u32, height: u32) -> Option<Vec<u8>> {
    if frame.width < width || frame.height < height {
        return None;
    }

    let src_row = (frame.width * 3) as usize;
    let dst_row = (width * 3) as usize;
    let mut data = Vec::with_capacity(dst_row * height as usize);
    for y in 0..height as usize {
        let start = y * src_row;
        data.extend_from_slice(&frame.data[start..start + dst_row]);
    }
    Some(data)
}

/// Generate the session output path: `recording_<timestamp>.mp4` in the
/// given directory (or the default Videos directory), created if needed.
pub fn generate_output_path(output_dir: Option<&Path>) -> Result<PathBuf, EncoderError> {
    let dir = match output_dir {
        Some(d) => d.to_path_buf(),
        None => default_output_dir()?,
    };

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| EncoderError::OutputDir(e.to_string()))?;
    }

    Ok(dir.join(output_file_name(Local::now())))
}

/// Deterministic session file name from the start timestamp.
fn output_file_name(now: DateTime<Local>) -> String {
    format!("recording_{}.mp4", now.format("%Y-%m-%d_%H%M%S"))
}

/// The user's Videos directory, falling back to `~/Videos`, then home.
fn default_output_dir() -> Result<PathBuf, EncoderError> {
    let user_dirs = UserDirs::new()
        .ok_or_else(|| EncoderError::OutputDir("could not determine user directories".into()))?;

    if let Some(videos) = user_dirs.video_dir() {
        return Ok(videos.to_path_buf());
    }

    let home = user_dirs.home_dir().to_path_buf();
    let videos = home.join("Videos");
    if videos.exists() || std::fs::create_dir_all(&videos).is_ok() {
        Ok(videos)
    } else {
        Ok(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_even_dimensions_rounds_down() {
        assert_eq!(even_dimensions(1921, 1080), (1920, 1080));
        assert_eq!(even_dimensions(1920, 1081), (1920, 1080));
        assert_eq!(even_dimensions(1, 1), (0, 0));
    }

    #[test]
    fn test_output_file_name_format() {
        let ts = Local.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(output_file_name(ts), "recording_2026-03-07_140509.mp4");
    }

    #[test]
    fn test_crop_to_exact_rows() {
        // 3x2 frame, crop to 2x1: first two pixels of the first row.
        let frame = Frame {
            width: 3,
            height: 2,
            data: (0u8..18).collect(),
        };

        let cropped = crop_to(&frame, 2, 1).unwrap();

        assert_eq!(cropped, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_crop_to_rejects_smaller_frame() {
        let frame = Frame {
            width: 2,
            height: 2,
            data: vec![0; 12],
        };

        assert!(crop_to(&frame, 4, 2).is_none());
        assert!(crop_to(&frame, 2, 4).is_none());
    }
}
