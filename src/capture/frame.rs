//! Frame data structures for captured camera content

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Resolution requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameQuality {
    /// Reduced-size frame for live scanning
    Preview,
    /// Full-resolution still
    High,
}

/// A captured frame, stored as encoded image bytes
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Encoded image (PNG, JPEG or BMP)
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Requested quality
    pub quality: FrameQuality,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32, quality: FrameQuality) -> Self {
        Self {
            data,
            width,
            height,
            quality,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// File extension matching the encoded data
    pub fn extension(&self) -> &'static str {
        match image::guess_format(&self.data) {
            Ok(image::ImageFormat::Png) => "png",
            Ok(image::ImageFormat::Bmp) => "bmp",
            _ => "jpg",
        }
    }

    /// Write the frame into `dir` under a fresh name and return the path.
    ///
    /// Names carry a timestamp plus a random suffix, so saves within the
    /// same millisecond never overwrite each other.
    pub fn save_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let prefix = format!("capture_{}_", chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f"));
        let suffix = format!(".{}", self.extension());

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(dir)?;
        file.write_all(&self.data)?;
        file.flush()?;

        let (_, path) = file.keep()?;
        Ok(path)
    }

    /// Spill the frame to a temporary file that is deleted when dropped
    pub fn to_temp_file(&self, dir: Option<&Path>) -> std::io::Result<tempfile::NamedTempFile> {
        let suffix = format!(".{}", self.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("adhesio-frame-").suffix(&suffix);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&self.data)?;
        file.flush()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::png_bytes;

    #[test]
    fn test_extension_and_dimensions() {
        let frame = CapturedFrame::new(png_bytes(4, 3), 4, 3, FrameQuality::High);
        assert_eq!(frame.extension(), "png");
        assert_eq!(frame.dimensions(), (4, 3));
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let frame = CapturedFrame::new(png_bytes(4, 4), 4, 4, FrameQuality::Preview);

        let file = frame.to_temp_file(Some(dir.path())).unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), frame.data);

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_save_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let frame = CapturedFrame::new(png_bytes(4, 4), 4, 4, FrameQuality::High);

        let path = frame.save_to_dir(&dir.path().join("captures")).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[test]
    fn test_saves_in_same_instant_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let first = CapturedFrame::new(png_bytes(4, 4), 4, 4, FrameQuality::High);
        let second = CapturedFrame::new(png_bytes(6, 6), 6, 6, FrameQuality::High);

        let a = first.save_to_dir(dir.path()).unwrap();
        let b = second.save_to_dir(dir.path()).unwrap();

        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), first.data);
        assert_eq!(std::fs::read(&b).unwrap(), second.data);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
