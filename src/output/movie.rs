use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::{
    foundation::error::{JobError, JobResult},
    output::ensure_parent_dir,
};

/// Parameters of one movie stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovieSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// Color that transparent pixels are flattened over (straight RGBA8).
    pub background: [u8; 4],
}

impl MovieSpec {
    pub fn validate(&self) -> JobResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(JobError::validation("movie width/height must be non-zero"));
        }
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(JobError::validation("movie fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(JobError::validation(
                "movie width/height must be even (required for yuv420p output)",
            ));
        }
        Ok(())
    }
}

/// An open movie stream receiving frames in order.
pub trait MovieWriter: Send {
    /// Append one straight-alpha RGBA8 frame.
    fn append(&mut self, frame: i32, rgba8: &[u8], width: u32, height: u32) -> JobResult<()>;

    /// Flush and close the stream.
    fn finish(self: Box<Self>) -> JobResult<()>;
}

/// Opens movie streams.
pub trait MovieWriterFactory: Send + Sync {
    fn start(&self, spec: &MovieSpec) -> JobResult<Box<dyn MovieWriter>>;
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Opens [`FfmpegMovieWriter`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegMovieFactory;

impl MovieWriterFactory for FfmpegMovieFactory {
    fn start(&self, spec: &MovieSpec) -> JobResult<Box<dyn MovieWriter>> {
        Ok(Box::new(FfmpegMovieWriter::new(spec.clone())?))
    }
}

/// H.264 MP4 writer piping raw frames into the system `ffmpeg` binary.
pub struct FfmpegMovieWriter {
    spec: MovieSpec,
    child: Child,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl FfmpegMovieWriter {
    pub fn new(spec: MovieSpec) -> JobResult<Self> {
        spec.validate()?;
        ensure_parent_dir(&spec.path)?;

        if !is_ffmpeg_on_path() {
            return Err(JobError::output(
                "ffmpeg is required for movie output, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", spec.width, spec.height),
            "-r",
            &format!("{}/{}", spec.fps_num, spec.fps_den),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&spec.path);

        let mut child = cmd
            .spawn()
            .map_err(|e| JobError::output(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| JobError::output("failed to open ffmpeg stdin"))?;

        tracing::debug!(path = %spec.path.display(), width = spec.width, height = spec.height, "movie opened");
        Ok(Self {
            scratch: vec![0u8; (spec.width * spec.height * 4) as usize],
            spec,
            child,
            stdin: Some(stdin),
        })
    }
}

impl MovieWriter for FfmpegMovieWriter {
    fn append(&mut self, frame: i32, rgba8: &[u8], width: u32, height: u32) -> JobResult<()> {
        if (width, height) != (self.spec.width, self.spec.height) {
            return Err(JobError::output(format!(
                "frame {frame} is {width}x{height}, movie expects {}x{}",
                self.spec.width, self.spec.height
            )));
        }
        flatten_to_opaque_rgba8(&mut self.scratch, rgba8, self.spec.background)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(JobError::output("movie is already finished"));
        };
        stdin
            .write_all(&self.scratch)
            .map_err(|e| JobError::output(format!("failed to write frame {frame} to ffmpeg: {e}")))?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> JobResult<()> {
        drop(self.stdin.take());
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| JobError::output(format!("failed to wait for ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::output(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Composite straight-alpha RGBA8 over an opaque background.
pub(crate) fn flatten_to_opaque_rgba8(dst: &mut [u8], src: &[u8], bg: [u8; 4]) -> JobResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(JobError::output(
            "flatten expects equal-length RGBA8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        let inv = 255 - a;
        for i in 0..3 {
            let v = mul_div255(u16::from(s[i]), a) + mul_div255(u16::from(bg[i]), inv);
            d[i] = v.min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}

#[cfg(test)]
#[path = "../../tests/unit/output/movie.rs"]
mod tests;
