//! Image preprocessing for the adhesion model
//!
//! Resizes to the fixed square model input, scales pixels to 0-1, applies
//! per-channel normalization and lays the result out as a batch of one.

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array3, Array4, Axis};

use super::error::ClassifyError;
use crate::config::{ClassifierSettings, TensorLayout};

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Side length of the square model input
    pub input_size: u32,
    /// 3 for RGB, 1 for luma
    pub channels: u32,
    /// Output tensor layout
    pub layout: TensorLayout,
    /// Mean values for normalization [R, G, B]
    pub mean: [f32; 3],
    /// Std values for normalization [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::from(&ClassifierSettings::default())
    }
}

impl From<&ClassifierSettings> for PreprocessConfig {
    fn from(settings: &ClassifierSettings) -> Self {
        Self {
            input_size: settings.input_size,
            channels: settings.channels,
            layout: settings.layout,
            mean: settings.mean,
            std: settings.std,
        }
    }
}

impl PreprocessConfig {
    /// Shape of the tensor produced by [`preprocess_image`]
    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.input_size as usize;
        let channels = self.channels as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, size, size, channels],
            TensorLayout::Nchw => [1, channels, size, size],
        }
    }
}

/// Resize an image to `size`x`size` and convert it to an HWC f32 array in 0-1
pub fn resize_to_hwc(image: &DynamicImage, size: u32, channels: u32) -> Result<Array3<f32>, ClassifyError> {
    let resized = image.resize_exact(size, size, FilterType::Triangle);

    let raw: Vec<u8> = match channels {
        3 => resized.to_rgb8().into_raw(),
        1 => resized.to_luma8().into_raw(),
        other => {
            return Err(ClassifyError::Inference(format!(
                "unsupported channel count {}",
                other
            )))
        }
    };

    let data: Vec<f32> = raw.into_iter().map(|v| v as f32 / 255.0).collect();
    Array3::from_shape_vec((size as usize, size as usize, channels as usize), data)
        .map_err(|e| ClassifyError::Inference(e.to_string()))
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (h, w, c) = image.dim();
    let mut normalized = Array3::<f32>::zeros((h, w, c));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                let i = ch.min(2);
                normalized[[y, x, ch]] = (image[[y, x, ch]] - mean[i]) / std[i];
            }
        }
    }

    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Full preprocessing pipeline
pub fn preprocess_image(image: &DynamicImage, config: &PreprocessConfig) -> Result<Array4<f32>, ClassifyError> {
    let hwc = resize_to_hwc(image, config.input_size, config.channels)?;
    let normalized = normalize(&hwc, &config.mean, &config.std);

    Ok(match config.layout {
        TensorLayout::Nhwc => normalized.insert_axis(Axis(0)),
        TensorLayout::Nchw => hwc_to_nchw(&normalized),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_resize_to_hwc() {
        let hwc = resize_to_hwc(&solid(40, 10, [255, 0, 0]), 8, 3).unwrap();

        assert_eq!(hwc.dim(), (8, 8, 3));
        assert!((hwc[[3, 3, 0]] - 1.0).abs() < 0.01);
        assert!(hwc[[3, 3, 1]].abs() < 0.01);
        assert!(hwc[[3, 3, 2]].abs() < 0.01);
    }

    #[test]
    fn test_resize_to_luma() {
        let hwc = resize_to_hwc(&solid(4, 4, [255, 255, 255]), 2, 1).unwrap();
        assert_eq!(hwc.dim(), (2, 2, 1));
        assert!((hwc[[0, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_unsupported_channels() {
        assert!(resize_to_hwc(&solid(4, 4, [0, 0, 0]), 2, 4).is_err());
    }

    #[test]
    fn test_hwc_to_nchw() {
        let hwc = Array3::<f32>::from_shape_fn((10, 20, 3), |(h, w, c)| {
            (h * 100 + w * 10 + c) as f32
        });

        let nchw = hwc_to_nchw(&hwc);

        assert_eq!(nchw.dim(), (1, 3, 10, 20));
        assert_eq!(nchw[[0, 1, 5, 10]], hwc[[5, 10, 1]]);
    }

    #[test]
    fn test_normalize() {
        let image = Array3::<f32>::from_elem((2, 2, 3), 0.5);
        let mean = [0.485, 0.456, 0.406];
        let std = [0.229, 0.224, 0.225];

        let normalized = normalize(&image, &mean, &std);

        assert!((normalized[[0, 0, 0]] - (0.5 - 0.485) / 0.229).abs() < 0.01);
        assert!((normalized[[1, 1, 2]] - (0.5 - 0.406) / 0.225).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_shapes() {
        let image = solid(300, 200, [10, 200, 30]);

        let nhwc = PreprocessConfig::default();
        let tensor = preprocess_image(&image, &nhwc).unwrap();
        assert_eq!(tensor.shape(), &nhwc.input_shape());
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);

        let nchw = PreprocessConfig {
            layout: TensorLayout::Nchw,
            ..PreprocessConfig::default()
        };
        let tensor = preprocess_image(&image, &nchw).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_is_not_all_zero() {
        let tensor = preprocess_image(&solid(16, 16, [128, 64, 32]), &PreprocessConfig::default()).unwrap();
        assert!(tensor.iter().any(|&v| v > 0.0));
    }
}
