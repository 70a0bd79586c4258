// src/media/mod.rs
//! Media transform seam: watermarking images/videos and probing frame sizes.
//! The pixel work itself is delegated (see `ffmpeg`).

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            "mp4" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
        }
    }
}

/// Logo size and top-right margin, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkPlacement {
    pub size: u32,
    pub margin: u32,
}

impl Default for WatermarkPlacement {
    fn default() -> Self {
        Self {
            size: 200,
            margin: 10,
        }
    }
}

impl WatermarkPlacement {
    /// Top-left corner of the logo for a frame of `width` x `height`.
    /// Frames narrower than the logo clamp to x = 0.
    pub fn anchor(&self, width: u32, _height: u32) -> (u32, u32) {
        let x = width.saturating_sub(self.size.saturating_add(self.margin));
        (x, self.margin)
    }
}

#[async_trait]
pub trait MediaTransformer: Send + Sync {
    /// Composite `logo` onto the image at `input`, writing `output`.
    async fn watermark_image(&self, input: &Path, logo: &Path, output: &Path) -> Result<PathBuf>;

    /// (width, height) of the first video stream.
    async fn probe_dimensions(&self, input: &Path) -> Result<(u32, u32)>;

    /// Re-encode the visual stream with `logo` at `position`; audio is copied untouched.
    async fn watermark_video(
        &self,
        input: &Path,
        logo: &Path,
        output: &Path,
        position: (u32, u32),
    ) -> Result<PathBuf>;
}
