use crate::all::*;

use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

// Interleaved RGB24.
pub struct VideoFrame {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl VideoFrame {
  pub fn new(width: usize, height: usize) -> VideoFrame {
    VideoFrame {
      data: vec![0; 3 * width * height],
      width,
      height,
    }
  }
}

pub trait FrameSource {
  // Not using `impl Iterator` to allow returning `Result`.
  // End of data is signaled by `Result::Ok(Option::None)`.
  fn next(&mut self) -> Result<Option<&VideoFrame>>;

  fn size(&self) -> [usize; 2];
}

#[derive(Deserialize)]
struct ProbeStream {
  width: usize,
  height: usize,
}

#[derive(Deserialize)]
struct ProbeRoot {
  streams: Vec<ProbeStream>,
}

// Decodes a video file through an `ffmpeg` child process.
pub struct VideoInput {
  child: Child,
  child_stdout: ChildStdout,
  video_frame: VideoFrame,
}

impl VideoInput {
  pub fn new(path: &Path, scale: f64) -> Result<VideoInput> {
    if !path.exists() {
      bail!("Video file {} does not exist.", path.display());
    }
    let [width, height] = probe_size(path)?;
    let [width, height] = scaled_size([width, height], scale);
    if width == 0 || height == 0 {
      bail!("Scaled video size {}x{} is empty.", width, height);
    }
    let mut child = Command::new("ffmpeg")
      .args(["-loglevel", "error", "-nostdin", "-i"])
      .arg(path)
      .arg("-vf").arg(format!("scale={}:{}", width, height))
      .args(["-f", "rawvideo", "-vcodec", "rawvideo", "-vsync", "vfr", "-pix_fmt", "rgb24", "-"])
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .spawn()
      .context("Failed to start ffmpeg for decoding.")?;
    let child_stdout = child.stdout.take().ok_or(anyhow!("Failed to capture ffmpeg output."))?;
    info!("Reading {} at {}x{}.", path.display(), width, height);
    Ok(VideoInput {
      child,
      child_stdout,
      video_frame: VideoFrame::new(width, height),
    })
  }
}

impl FrameSource for VideoInput {
  fn next(&mut self) -> Result<Option<&VideoFrame>> {
    let n = self.video_frame.data.len();
    let mut filled = 0;
    while filled < n {
      match self.child_stdout.read(&mut self.video_frame.data[filled..]) {
        Ok(0) => break,
        Ok(k) => filled += k,
        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
        Err(err) => return Err(err).context("Reading bytes from video input failed."),
      }
    }
    if filled == 0 {
      let status = self.child.wait().context("Failed to wait for ffmpeg.")?;
      if !status.success() {
        bail!("Video decoder exited with {}.", status);
      }
      return Ok(None);
    }
    if filled < n {
      bail!("Truncated video frame: got {} of {} bytes.", filled, n);
    }
    Ok(Some(&self.video_frame))
  }

  fn size(&self) -> [usize; 2] {
    [self.video_frame.width, self.video_frame.height]
  }
}

impl Drop for VideoInput {
  fn drop(&mut self) {
    // Already exited on clean end of stream, in which case this is a no-op.
    let _ = self.child.kill();
    let _ = self.child.wait();
  }
}

fn probe_size(path: &Path) -> Result<[usize; 2]> {
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-select_streams", "v:0", "-show_entries", "stream=width,height", "-of", "json"])
    .arg(path)
    .output()
    .context("Failed to run ffprobe.")?;
  if !output.status.success() {
    bail!("ffprobe failed on {}: {}", path.display(), String::from_utf8_lossy(&output.stderr).trim());
  }
  parse_probe(&output.stdout)
    .context(format!("Failed to parse ffprobe output for {}.", path.display()))
}

fn parse_probe(json: &[u8]) -> Result<[usize; 2]> {
  let root: ProbeRoot = serde_json::from_slice(json)?;
  let stream = root.streams.first().ok_or(anyhow!("No video stream."))?;
  Ok([stream.width, stream.height])
}

// Rounded down to even numbers, which most encoders require.
pub fn scaled_size(size: [usize; 2], scale: f64) -> [usize; 2] {
  let f = |s: usize| ((s as f64 * scale / 2.).floor() as usize) * 2;
  [f(size[0]), f(size[1])]
}

// Encodes RGB24 frames into a video file through an `ffmpeg` child process.
pub struct VideoOutput {
  child: Child,
  child_stdin: Option<ChildStdin>,
  width: usize,
  height: usize,
}

impl VideoOutput {
  pub fn new(path: &Path, width: usize, height: usize, fps: f64) -> Result<VideoOutput> {
    let mut child = Command::new("ffmpeg")
      .args(["-loglevel", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
      .arg("-s").arg(format!("{}x{}", width, height))
      .arg("-r").arg(format!("{}", fps))
      .args(["-i", "-"])
      // MPEG-4 part 2, playable in the same places XVID is.
      .args(["-c:v", "mpeg4", "-q:v", "5", "-pix_fmt", "yuv420p"])
      .arg(path)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .spawn()
      .context("Failed to start ffmpeg for encoding.")?;
    let child_stdin = child.stdin.take().ok_or(anyhow!("Failed to open ffmpeg input."))?;
    info!("Writing {} at {}x{}, {} fps.", path.display(), width, height, fps);
    Ok(VideoOutput {
      child,
      child_stdin: Some(child_stdin),
      width,
      height,
    })
  }

  pub fn write(&mut self, frame: &VideoFrame) -> Result<()> {
    if frame.width != self.width || frame.height != self.height {
      bail!("Output frame size {}x{} does not match video size {}x{}.",
        frame.width, frame.height, self.width, self.height);
    }
    let stdin = self.child_stdin.as_mut().ok_or(anyhow!("Video output already closed."))?;
    stdin.write_all(&frame.data).context("Writing frame to video encoder failed.")
  }

  // Closing stdin lets ffmpeg finish the file.
  pub fn finish(&mut self) -> Result<()> {
    if self.child_stdin.take().is_none() { return Ok(()) }
    let status = self.child.wait().context("Failed to wait for ffmpeg.")?;
    if !status.success() {
      bail!("Video encoder exited with {}.", status);
    }
    Ok(())
  }
}

impl Drop for VideoOutput {
  fn drop(&mut self) {
    if let Err(err) = self.finish() {
      error!("{:#}", err);
    }
  }
}
