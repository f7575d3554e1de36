//! Camera devices
//!
//! [`DirectoryCamera`] replays image files from a folder so live scanning can
//! run without camera hardware.

use anyhow::{bail, Context, Result};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, GenericImageView};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::frame::{CapturedFrame, FrameQuality};

/// A camera the capture controller can drive
pub trait Camera: Send {
    /// Open the device
    fn initialize(&mut self) -> Result<()>;
    /// Grab one frame
    fn capture_frame(&mut self, quality: FrameQuality) -> Result<CapturedFrame>;
    /// Close the device. Must be safe to call more than once
    fn release(&mut self);
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Camera that cycles through the images in a directory
pub struct DirectoryCamera {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    preview_max_dimension: u32,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>, preview_max_dimension: u32) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            next: 0,
            preview_max_dimension: preview_max_dimension.max(1),
        }
    }

    /// Directory frames are read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn preview(&self, data: &[u8]) -> Result<CapturedFrame> {
        let image = image::load_from_memory(data).context("Failed to decode frame")?;
        let max = self.preview_max_dimension;
        let image = if image.width() > max || image.height() > max {
            image.resize(max, max, FilterType::Triangle)
        } else {
            image
        };

        let rgb = image.to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, 80)
            .encode_image(&rgb)
            .context("Failed to encode preview frame")?;

        Ok(CapturedFrame::new(
            encoded,
            rgb.width(),
            rgb.height(),
            FrameQuality::Preview,
        ))
    }
}

impl Camera for DirectoryCamera {
    fn initialize(&mut self) -> Result<()> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to open camera directory {:?}", self.dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            bail!("No images found in {:?}", self.dir);
        }

        info!("Directory camera ready with {} frames from {:?}", files.len(), self.dir);
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn capture_frame(&mut self, quality: FrameQuality) -> Result<CapturedFrame> {
        if self.files.is_empty() {
            bail!("Camera is not initialized");
        }

        let path = &self.files[self.next % self.files.len()];
        self.next = self.next.wrapping_add(1);
        debug!("Capturing {:?} frame from {:?}", quality, path);

        let data = std::fs::read(path).with_context(|| format!("Failed to read frame {:?}", path))?;

        match quality {
            FrameQuality::Preview => self.preview(&data),
            FrameQuality::High => {
                let (width, height) = image::load_from_memory(&data)
                    .context("Failed to decode frame")?
                    .dimensions();
                Ok(CapturedFrame::new(data, width, height, FrameQuality::High))
            }
        }
    }

    fn release(&mut self) {
        if !self.files.is_empty() {
            info!("Releasing directory camera {:?}", self.dir);
        }
        self.files.clear();
        self.next = 0;
    }
}
