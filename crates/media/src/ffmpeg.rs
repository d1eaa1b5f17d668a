//! ffmpeg/ffprobe subprocess backend.
//!
//! Decoding runs `ffmpeg ... -f rawvideo -pix_fmt rgb24 -` and reads whole
//! frames from its stdout. Encoding feeds raw frames into a second ffmpeg
//! process writing to a `.partial` file next to the requested output.

use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;

use evmag_common::error::{EvmError, EvmResult};
use evmag_model::frame::RawFrame;
use evmag_model::stream::{ColorMode, FrameRate, VideoStreamProperties};

use crate::backend::{MediaBackend, SinkOptions, VideoCodec, VideoSink, VideoSource};
use crate::output::{check_output_path, PartialOutput};

/// Backend driving the `ffmpeg` and `ffprobe` binaries found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, path: &Path) -> EvmResult<Box<dyn VideoSource>> {
        Ok(Box::new(FfmpegSource::open(path)?))
    }

    fn check_sink(&self, path: &Path, _options: &SinkOptions) -> EvmResult<()> {
        check_output_path(path)
    }

    fn create_sink(&self, path: &Path, options: &SinkOptions) -> EvmResult<Box<dyn VideoSink>> {
        Ok(Box::new(FfmpegSink::create(path, options)?))
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg") && command_exists("ffprobe")
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Read width, height, and frame rate of the first video stream of `path`.
pub fn probe_video(path: &Path) -> EvmResult<VideoStreamProperties> {
    if !path.is_file() {
        return Err(EvmError::source_unavailable(path, "no such file"));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| EvmError::source_unavailable(path, format!("failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EvmError::source_unavailable(
            path,
            format!("ffprobe failed ({}): {}", output.status, stderr.trim()),
        ));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&raw).map_err(|msg| EvmError::source_unavailable(path, msg))
}

fn parse_probe_output(raw: &str) -> Result<VideoStreamProperties, String> {
    let probe: ProbeOutput =
        serde_json::from_str(raw).map_err(|e| format!("unreadable ffprobe output: {e}"))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no frame size".to_string()),
    };

    // "0/0" means unknown; fall back from the container rate to the average.
    let frame_rate = [stream.r_frame_rate, stream.avg_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|rate| rate.parse::<FrameRate>().ok())
        .ok_or_else(|| "video stream has no usable frame rate".to_string())?;

    Ok(VideoStreamProperties::new(
        width,
        height,
        frame_rate,
        ColorMode::Rgb,
    ))
}

/// Collect a child's stderr on a separate thread so the pipe never fills up.
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || -> String {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    }))
}

fn join_stderr(task: Option<JoinHandle<String>>) -> String {
    task.map(|t| {
        t.join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
    })
    .unwrap_or_default()
}

/// Fill `buf` from `reader`, returning how many bytes were read before EOF.
fn read_frame_bytes(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Frames decoded by an ffmpeg child process.
pub struct FfmpegSource {
    path: PathBuf,
    properties: VideoStreamProperties,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    frames_read: usize,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> EvmResult<Self> {
        let properties = probe_video(path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            EvmError::source_unavailable(path, format!("failed to start ffmpeg: {e}"))
        })?;
        let stderr_task = drain_stderr(&mut child);
        let stdout = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EvmError::source_unavailable(
                    path,
                    "failed to capture ffmpeg stdout",
                ));
            }
        };

        tracing::info!(
            pid = child.id(),
            path = %path.display(),
            width = properties.width,
            height = properties.height,
            fps = %properties.frame_rate,
            "ffmpeg decoder started"
        );

        Ok(Self {
            path: path.to_path_buf(),
            properties,
            child,
            stdout,
            stderr_task,
            frames_read: 0,
            finished: false,
        })
    }

    fn finish_decoding(&mut self) -> EvmResult<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| EvmError::decode(format!("failed to wait on ffmpeg: {e}")))?;
        let stderr = join_stderr(self.stderr_task.take());

        if status.success() {
            tracing::debug!(frames = self.frames_read, "ffmpeg decoder finished");
            return Ok(());
        }
        let message = format!("ffmpeg decode failed ({status}): {}", stderr.trim());
        if self.frames_read == 0 {
            Err(EvmError::source_unavailable(&self.path, message))
        } else {
            Err(EvmError::decode(message))
        }
    }
}

impl VideoSource for FfmpegSource {
    fn properties(&self) -> VideoStreamProperties {
        self.properties
    }

    fn next_frame(&mut self) -> EvmResult<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.properties.frame_samples()];
        let filled = read_frame_bytes(&mut self.stdout, &mut data)
            .map_err(|e| EvmError::decode(format!("failed reading decoded frame: {e}")))?;

        if filled == 0 {
            self.finish_decoding()?;
            return Ok(None);
        }
        if filled < data.len() {
            self.finish_decoding()?;
            return Err(EvmError::decode(format!(
                "truncated frame {}: got {filled} of {} bytes",
                self.frames_read,
                data.len()
            )));
        }

        self.frames_read += 1;
        let frame = RawFrame::new(
            self.properties.width,
            self.properties.height,
            ColorMode::Rgb,
            data,
        )?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// ffmpeg arguments selecting and tuning `codec`.
fn codec_args(codec: VideoCodec) -> Vec<String> {
    match codec {
        VideoCodec::Mpeg4 => vec![
            "-c:v".to_string(),
            "mpeg4".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
        ],
        VideoCodec::Libx264 => vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            "18".to_string(),
        ],
    }
}

fn encoder_args(options: &SinkOptions, output: &Path) -> Vec<String> {
    let props = &options.properties;
    let input_pix_fmt = match props.color_mode {
        ColorMode::Rgb => "rgb24",
        ColorMode::Gray => "gray",
    };
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        input_pix_fmt.to_string(),
        "-s".to_string(),
        format!("{}x{}", props.width, props.height),
        "-framerate".to_string(),
        format!("{}/{}", props.frame_rate.num, props.frame_rate.den),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
    ];
    args.extend(codec_args(options.codec));
    args.extend([
        "-pix_fmt".to_string(),
        options
            .codec
            .output_pixel_format(props.width, props.height)
            .to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// Frames encoded by an ffmpeg child process.
pub struct FfmpegSink {
    output: PartialOutput,
    properties: VideoStreamProperties,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    frames_written: usize,
}

impl FfmpegSink {
    pub fn create(path: &Path, options: &SinkOptions) -> EvmResult<Self> {
        let output = PartialOutput::prepare(path)?;
        let args = encoder_args(options, output.partial_path());
        tracing::debug!(args = ?args, "Running ffmpeg encoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EvmError::sink_unavailable(path, format!("failed to start ffmpeg: {e}")))?;
        let stderr_task = drain_stderr(&mut child);
        let stdin = child.stdin.take();

        tracing::info!(
            pid = child.id(),
            path = %path.display(),
            codec = %options.codec,
            color_mode = %options.properties.color_mode,
            "ffmpeg encoder started"
        );

        Ok(Self {
            output,
            properties: options.properties,
            child: Some(child),
            stdin,
            stderr_task,
            frames_written: 0,
        })
    }

    /// Close stdin, wait for the encoder, and return its stderr on failure.
    fn wait_encoder(&mut self) -> EvmResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait().map_err(|e| {
            EvmError::sink_unavailable(
                self.output.final_path(),
                format!("failed to wait on ffmpeg: {e}"),
            )
        })?;
        let stderr = join_stderr(self.stderr_task.take());
        if !status.success() {
            return Err(EvmError::sink_unavailable(
                self.output.final_path(),
                format!("ffmpeg encode failed ({status}): {}", stderr.trim()),
            ));
        }
        Ok(())
    }
}

impl VideoSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RawFrame) -> EvmResult<()> {
        let props = &self.properties;
        if frame.width != props.width
            || frame.height != props.height
            || frame.color_mode != props.color_mode
        {
            return Err(EvmError::invalid_parameter(format!(
                "frame {}x{} {} does not match output stream {}x{} {}",
                frame.width,
                frame.height,
                frame.color_mode,
                props.width,
                props.height,
                props.color_mode
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(EvmError::sink_unavailable(
                self.output.final_path(),
                "encoder input already closed",
            ));
        };
        if let Err(e) = stdin.write_all(&frame.data) {
            // A broken pipe means ffmpeg exited; its stderr says why.
            self.wait_encoder()?;
            return Err(EvmError::sink_unavailable(
                self.output.final_path(),
                format!("failed writing frame {}: {e}", self.frames_written),
            ));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> EvmResult<PathBuf> {
        self.wait_encoder()?;
        let path = self.output.commit()?;
        tracing::info!(
            frames = self.frames_written,
            path = %path.display(),
            "ffmpeg encoder finished"
        );
        Ok(path)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::partial_path_for;

    #[test]
    fn test_parse_probe_output() {
        let raw = r#"{"programs":[],"streams":[{"width":640,"height":480,
            "r_frame_rate":"30000/1001","avg_frame_rate":"30000/1001"}]}"#;
        let props = parse_probe_output(raw).unwrap();
        assert_eq!((props.width, props.height), (640, 480));
        assert_eq!(props.frame_rate, FrameRate::new(30000, 1001).unwrap());
        assert_eq!(props.color_mode, ColorMode::Rgb);
    }

    #[test]
    fn test_parse_probe_output_falls_back_to_average_rate() {
        let raw = r#"{"streams":[{"width":2,"height":2,"r_frame_rate":"0/0","avg_frame_rate":"25/1"}]}"#;
        let props = parse_probe_output(raw).unwrap();
        assert_eq!(props.frame_rate, FrameRate::from_integer(25).unwrap());
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        let err = parse_probe_output(r#"{"streams":[]}"#).unwrap_err();
        assert!(err.contains("no video stream"));
        let err = parse_probe_output(r#"{"streams":[{"r_frame_rate":"30/1"}]}"#).unwrap_err();
        assert!(err.contains("frame size"));
    }

    #[test]
    fn test_probe_missing_file_is_source_unavailable() {
        let err = probe_video(Path::new("/nonexistent/evmag/clip.mp4")).unwrap_err();
        assert_eq!(err.kind(), "source_unavailable");
    }

    #[test]
    fn test_encoder_args_gray_mpeg4() {
        let options = SinkOptions {
            properties: VideoStreamProperties::new(
                4,
                2,
                FrameRate::new(30000, 1001).unwrap(),
                ColorMode::Gray,
            ),
            codec: VideoCodec::Mpeg4,
        };
        let args = encoder_args(&options, Path::new("/tmp/out.partial.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-pix_fmt gray -s 4x2 -framerate 30000/1001 -i -"));
        assert!(joined.contains("-c:v mpeg4 -q:v 2"));
        assert!(joined.ends_with("-pix_fmt yuv420p /tmp/out.partial.mp4"));
    }

    #[test]
    fn test_encoder_args_keep_odd_geometry_for_libx264() {
        let odd = SinkOptions {
            properties: VideoStreamProperties::new(
                641,
                480,
                FrameRate::from_integer(30).unwrap(),
                ColorMode::Rgb,
            ),
            codec: VideoCodec::Libx264,
        };
        let joined = encoder_args(&odd, Path::new("out.partial.mp4")).join(" ");
        assert!(joined.contains("-s 641x480"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.ends_with("-pix_fmt yuv444p out.partial.mp4"));
        assert!(!joined.contains("yuv420p"));

        let even = SinkOptions {
            properties: VideoStreamProperties::new(
                640,
                480,
                FrameRate::from_integer(30).unwrap(),
                ColorMode::Rgb,
            ),
            ..odd
        };
        let joined = encoder_args(&even, Path::new("out.partial.mp4")).join(" ");
        assert!(joined.ends_with("-pix_fmt yuv420p out.partial.mp4"));
    }

    #[test]
    fn test_check_sink_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let options = SinkOptions {
            properties: VideoStreamProperties::new(
                4,
                4,
                FrameRate::from_integer(30).unwrap(),
                ColorMode::Rgb,
            ),
            codec: VideoCodec::Mpeg4,
        };
        let backend = FfmpegBackend::new();
        let target = dir.path().join("out.mp4");
        assert!(backend.check_sink(&target, &options).is_ok());
        assert!(!target.exists());
        assert!(!partial_path_for(&target).exists());

        let err = backend
            .check_sink(&dir.path().join("nope").join("out.mp4"), &options)
            .unwrap_err();
        assert_eq!(err.kind(), "sink_unavailable");
    }

    #[test]
    fn test_codec_args_libx264() {
        let args = codec_args(VideoCodec::Libx264);
        assert_eq!(args[..2], ["-c:v".to_string(), "libx264".to_string()]);
        assert!(args.contains(&"-crf".to_string()));
    }

    #[test]
    fn test_read_frame_bytes_reports_short_reads() {
        let mut reader: &[u8] = &[1, 2, 3, 4, 5];
        let mut buf = [0u8; 3];
        assert_eq!(read_frame_bytes(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(read_frame_bytes(&mut reader, &mut buf).unwrap(), 2);
        assert_eq!(read_frame_bytes(&mut reader, &mut buf).unwrap(), 0);
    }
}
