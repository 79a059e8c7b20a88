use crate::core::error::AssemblyError;
use crate::core::state::Story;
use crate::utils::audio::{concat_wavs, wav_duration};
use crate::utils::text::preview;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    /// Silence between segments in the audio-only output.
    #[serde(default = "default_gap_ms")]
    pub gap_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            gap_ms: default_gap_ms(),
        }
    }
}

fn default_gap_ms() -> u32 {
    300
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VideoConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_resolution")]
    pub resolution: [u32; 2],
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_fontsize")]
    pub fontsize: u32,
    #[serde(default = "default_font_color")]
    pub font_color: String,
    #[serde(default = "default_background")]
    pub default_background: String,
    #[serde(default = "default_title_duration")]
    pub title_duration_s: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            resolution: default_resolution(),
            fps: default_fps(),
            font: default_font(),
            fontsize: default_fontsize(),
            font_color: default_font_color(),
            default_background: default_background(),
            title_duration_s: default_title_duration(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_resolution() -> [u32; 2] {
    [1920, 1080]
}
fn default_fps() -> u32 {
    24
}
fn default_font() -> String {
    "Arial".to_string()
}
fn default_fontsize() -> u32 {
    48
}
fn default_font_color() -> String {
    "white".to_string()
}
fn default_background() -> String {
    "data/default_bg.png".to_string()
}
fn default_title_duration() -> f64 {
    5.0
}

/// Renders and joins video clips.
#[async_trait]
pub trait VideoCompositor: Send + Sync {
    /// Creates a plain black background image at `path`.
    async fn create_background(&self, path: &Path) -> Result<()>;
    async fn title_clip(&self, title: &str, author: &str, background: &Path, out: &Path) -> Result<()>;
    /// Background plus caption, as long as the audio.
    async fn segment_clip(&self, text: &str, audio: &Path, duration: f64, background: &Path, out: &Path) -> Result<()>;
    async fn concat(&self, clips: &[PathBuf], out: &Path) -> Result<()>;
}

/// Compositing through the `ffmpeg` binary.
pub struct FfmpegCompositor {
    config: VideoConfig,
}

impl FfmpegCompositor {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn size(&self) -> String {
        format!("{}x{}", self.config.resolution[0], self.config.resolution[1])
    }

    fn scale(&self) -> String {
        let [w, h] = self.config.resolution;
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        )
    }

    fn drawtext(&self, textfile: &Path, fontsize: u32, y: &str) -> String {
        format!(
            "drawtext=textfile='{}':font='{}':fontsize={}:fontcolor={}:line_spacing=8:x=(w-text_w)/2:y={}",
            filter_escape(&textfile.to_string_lossy()),
            filter_escape(&self.config.font),
            fontsize,
            self.config.font_color,
            y
        )
    }

    /// Characters per caption line at 80% of the frame width.
    fn caption_width(&self, fontsize: u32) -> usize {
        let usable = self.config.resolution[0] as f64 * 0.8;
        ((usable / (fontsize.max(1) as f64 * 0.55)) as usize).max(10)
    }

    fn encode_args(&self) -> Vec<String> {
        [
            "-c:v", "libx264", "-tune", "stillimage", "-pix_fmt", "yuv420p", "-c:a", "aac", "-ar",
            "44100", "-ac", "2",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(["-r".to_string(), self.config.fps.to_string()])
        .collect()
    }
}

/// Escapes a value for use inside a quoted ffmpeg filter option.
fn filter_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Greedy word wrap to at most `width` characters per line.
pub fn wrap_caption(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}

async fn run_ffmpeg(args: &[String]) -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(["-hide_banner", "-loglevel", "error"])
        .args(args)
        .output()
        .await
        .context("Failed to run ffmpeg")?;
    if !output.status.success() {
        return Err(anyhow!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

fn sidecar(out: &Path, suffix: &str) -> PathBuf {
    let mut name = out.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    out.with_file_name(name)
}

#[async_trait]
impl VideoCompositor for FfmpegCompositor {
    async fn create_background(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        run_ffmpeg(&[
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("color=c=black:s={}", self.size()),
            "-frames:v".to_string(),
            "1".to_string(),
            path.to_string_lossy().to_string(),
        ])
        .await
    }

    async fn title_clip(&self, title: &str, author: &str, background: &Path, out: &Path) -> Result<()> {
        let title_size = self.config.fontsize * 3 / 2;
        let author_size = self.config.fontsize * 4 / 5;
        let title_file = sidecar(out, "_title.txt");
        let author_file = sidecar(out, "_author.txt");
        tokio::fs::write(&title_file, wrap_caption(title, self.caption_width(title_size))).await?;
        tokio::fs::write(&author_file, format!("por {}", author)).await?;

        let filter = format!(
            "{},{},{}",
            self.scale(),
            self.drawtext(&title_file, title_size, "(h-text_h)/2"),
            self.drawtext(&author_file, author_size, &format!("(h/2)+{}", title_size * 2))
        );
        let mut args = vec![
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            background.to_string_lossy().to_string(),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            "anullsrc=r=44100:cl=stereo".to_string(),
            "-t".to_string(),
            format!("{:.3}", self.config.title_duration_s),
            "-vf".to_string(),
            filter,
        ];
        args.extend(self.encode_args());
        args.push(out.to_string_lossy().to_string());
        run_ffmpeg(&args).await
    }

    async fn segment_clip(&self, text: &str, audio: &Path, duration: f64, background: &Path, out: &Path) -> Result<()> {
        let caption_file = sidecar(out, ".txt");
        let caption = wrap_caption(text, self.caption_width(self.config.fontsize));
        tokio::fs::write(&caption_file, caption).await?;

        let filter = format!(
            "{},{}",
            self.scale(),
            self.drawtext(&caption_file, self.config.fontsize, "h-text_h-60")
        );
        let mut args = vec![
            "-loop".to_string(),
            "1".to_string(),
            "-i".to_string(),
            background.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{:.3}", duration),
            "-vf".to_string(),
            filter,
        ];
        args.extend(self.encode_args());
        args.push("-shortest".to_string());
        args.push(out.to_string_lossy().to_string());
        run_ffmpeg(&args).await
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> Result<()> {
        let list_path = sidecar(out, "_clips.txt");
        let list: String = clips
            .iter()
            .map(|c| {
                let absolute = std::path::absolute(c).unwrap_or_else(|_| c.clone());
                format!("file '{}'\n", absolute.to_string_lossy().replace('\'', "'\\''"))
            })
            .collect();
        tokio::fs::write(&list_path, list).await?;

        let result = run_ffmpeg(&[
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            out.to_string_lossy().to_string(),
        ])
        .await;
        tokio::fs::remove_file(&list_path).await.ok();
        result
    }
}

/// Builds the final audio or video file from the synthesized segments, in
/// script order.
pub struct MediaAssembler {
    audio: AudioConfig,
    video: VideoConfig,
    compositor: Box<dyn VideoCompositor>,
}

impl MediaAssembler {
    pub fn new(audio: &AudioConfig, video: &VideoConfig, compositor: Box<dyn VideoCompositor>) -> Self {
        Self {
            audio: audio.clone(),
            video: video.clone(),
            compositor,
        }
    }

    /// Script segments whose audio exists on disk, in script order.
    fn playable(story: &Story) -> Vec<(usize, PathBuf)> {
        story
            .script
            .iter()
            .enumerate()
            .filter_map(|(i, d)| match d.audio_path.as_deref() {
                Some(path) if Path::new(path).exists() => Some((i, PathBuf::from(path))),
                _ => {
                    warn!("Skipping segment without audio: {}", preview(&d.text, 30));
                    None
                }
            })
            .collect()
    }

    pub async fn assemble_audio(&self, story: &Story, output: &Path) -> Result<PathBuf, AssemblyError> {
        let inputs: Vec<PathBuf> = Self::playable(story).into_iter().map(|(_, p)| p).collect();
        if inputs.is_empty() {
            return Err(AssemblyError::NoSegments);
        }

        info!("Joining {} audio segments into {}", inputs.len(), output.display());
        let joined = concat_wavs(&inputs, output, self.audio.gap_ms).map_err(|e| AssemblyError::Export {
            path: output.display().to_string(),
            reason: format!("{:#}", e),
        })?;
        if joined == 0 {
            return Err(AssemblyError::NoSegments);
        }
        info!("Audio exported to {}", output.display());
        Ok(output.to_path_buf())
    }

    pub async fn assemble_video(
        &self,
        story: &Story,
        build_dir: &Path,
        output: &Path,
    ) -> Result<PathBuf, AssemblyError> {
        let segments = Self::playable(story);
        if segments.is_empty() {
            return Err(AssemblyError::NoSegments);
        }

        let clips_dir = build_dir.join("clips");
        tokio::fs::create_dir_all(&clips_dir)
            .await
            .map_err(|e| AssemblyError::Export {
                path: clips_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let background = PathBuf::from(&self.video.default_background);
        if !background.exists() {
            warn!("Background image not found, creating a default one at {}", background.display());
            self.compositor
                .create_background(&background)
                .await
                .map_err(|e| AssemblyError::Tool {
                    tool: "ffmpeg".to_string(),
                    reason: format!("{:#}", e),
                })?;
        }

        let mut clips = Vec::new();
        let title_path = clips_dir.join("title.mp4");
        match self
            .compositor
            .title_clip(&story.title, &story.author, &background, &title_path)
            .await
        {
            Ok(()) => clips.push(title_path),
            Err(e) => warn!("Failed to render the title clip: {:#}", e),
        }

        let mut rendered = 0;
        for (index, audio) in segments {
            let text = &story.script[index].text;
            let out = clips_dir.join(format!("clip_{:04}.mp4", index));
            let result = match wav_duration(&audio) {
                Ok(duration) => {
                    self.compositor
                        .segment_clip(text, &audio, duration, &background, &out)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    clips.push(out);
                    rendered += 1;
                }
                Err(e) => warn!("Failed to render clip for '{}': {:#}", preview(text, 30), e),
            }
        }
        if rendered == 0 {
            return Err(AssemblyError::NoSegments);
        }

        info!("Exporting {} clips to {}", clips.len(), output.display());
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        self.compositor
            .concat(&clips, output)
            .await
            .map_err(|e| AssemblyError::Export {
                path: output.display().to_string(),
                reason: format!("{:#}", e),
            })?;
        info!("Video exported to {}", output.display());
        Ok(output.to_path_buf())
    }
}
