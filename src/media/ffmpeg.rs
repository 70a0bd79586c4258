// src/media/ffmpeg.rs
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{MediaTransformer, WatermarkPlacement};

/// Shells out to `ffmpeg` / `ffprobe` for both stills and videos.
#[derive(Debug, Clone)]
pub struct FfmpegTransformer {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    placement: WatermarkPlacement,
}

impl FfmpegTransformer {
    pub fn new(ffmpeg_bin: &str, ffprobe_bin: &str, placement: WatermarkPlacement) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.to_string(),
            ffprobe_bin: ffprobe_bin.to_string(),
            placement,
        }
    }

    fn logo_filter(&self, overlay_at: &str) -> String {
        let s = self.placement.size;
        format!("[1:v]scale={s}:{s}[logo];[0:v][logo]overlay={overlay_at}")
    }
}

impl Default for FfmpegTransformer {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe", WatermarkPlacement::default())
    }
}

#[async_trait]
impl MediaTransformer for FfmpegTransformer {
    async fn watermark_image(&self, input: &Path, logo: &Path, output: &Path) -> Result<PathBuf> {
        // W/w are ffmpeg's main/overlay widths, so no probe is needed for stills.
        let at = format!("W-w-{m}:{m}", m = self.placement.margin);
        let args = vec![
            "-y".to_string(),
            "-i".into(),
            path_arg(input),
            "-i".into(),
            path_arg(logo),
            "-filter_complex".into(),
            self.logo_filter(&at),
            "-frames:v".into(),
            "1".into(),
            path_arg(output),
        ];
        run_tool(&self.ffmpeg_bin, &args).await?;
        Ok(output.to_path_buf())
    }

    async fn probe_dimensions(&self, input: &Path) -> Result<(u32, u32)> {
        let args = vec![
            "-v".to_string(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-count_packets".into(),
            "-show_entries".into(),
            "stream=width,height".into(),
            "-of".into(),
            "csv=p=0".into(),
            path_arg(input),
        ];
        let out = run_tool(&self.ffprobe_bin, &args).await?;
        parse_probe_output(&out)
    }

    async fn watermark_video(
        &self,
        input: &Path,
        logo: &Path,
        output: &Path,
        position: (u32, u32),
    ) -> Result<PathBuf> {
        let at = format!("{}:{}", position.0, position.1);
        let args = vec![
            "-y".to_string(),
            "-i".into(),
            path_arg(input),
            "-i".into(),
            path_arg(logo),
            "-filter_complex".into(),
            self.logo_filter(&at),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "slow".into(),
            "-crf".into(),
            "18".into(),
            "-c:a".into(),
            "copy".into(),
            path_arg(output),
        ];
        run_tool(&self.ffmpeg_bin, &args).await?;
        Ok(output.to_path_buf())
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

async fn run_tool(program: &str, args: &[String]) -> Result<String> {
    tracing::debug!(target: "transform", program, ?args, "running media tool");
    let out = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("spawning {program}"))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        bail!("{program} exited with {}: {tail}", out.status);
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Parses ffprobe's `csv=p=0` output, e.g. `"1080,1920\n"`.
pub fn parse_probe_output(s: &str) -> Result<(u32, u32)> {
    let line = s
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("empty ffprobe output"))?;
    let mut parts = line.split(',').map(str::trim);
    let w = parts
        .next()
        .ok_or_else(|| anyhow!("missing width in {line:?}"))?
        .parse::<u32>()
        .with_context(|| format!("bad width in {line:?}"))?;
    let h = parts
        .next()
        .ok_or_else(|| anyhow!("missing height in {line:?}"))?
        .parse::<u32>()
        .with_context(|| format!("bad height in {line:?}"))?;
    Ok((w, h))
}
