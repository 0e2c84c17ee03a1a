//! Floating-point image loading, saving and compositing.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, Rgba};

use crate::error::{AdvIoError, Result};

/// Interleaved float image with values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// 3 for RGB, 4 for RGBA.
    pub channels: usize,
    /// Row-major pixel data.
    pub data: Vec<f32>,
}

impl FloatImage {
    /// Image filled with `value` in every channel.
    pub fn filled(width: u32, height: u32, channels: usize, value: f32) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![value; width as usize * height as usize * channels],
        }
    }

    /// Wrap raw data, checking its length.
    pub fn from_data(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize * channels;
        if data.len() != expected || !(channels == 3 || channels == 4) {
            return Err(AdvIoError::Image(format!(
                "expected {} values for {}x{}x{}, got {}",
                expected,
                width,
                height,
                channels,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Number of pixels.
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Channel values at pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let start = (y as usize * self.width as usize + x as usize) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// True if an alpha channel is present.
    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// Per-pixel alpha, or all ones for RGB images.
    pub fn alpha(&self) -> Vec<f32> {
        if self.has_alpha() {
            self.data.chunks_exact(4).map(|p| p[3]).collect()
        } else {
            vec![1.0; self.num_pixels()]
        }
    }

    /// RGB channels composited over `background` (which must match in size).
    pub fn composite_over(&self, background: &FloatImage) -> Result<FloatImage> {
        if !self.has_alpha() {
            return Ok(self.to_rgb());
        }
        if (background.width, background.height) != (self.width, self.height) {
            return Err(AdvIoError::DimensionMismatch {
                expected: (self.width, self.height),
                got: (background.width, background.height),
            });
        }
        let mut data = Vec::with_capacity(self.num_pixels() * 3);
        for (fg, bg) in self
            .data
            .chunks_exact(4)
            .zip(background.data.chunks_exact(background.channels))
        {
            let a = fg[3];
            for c in 0..3 {
                data.push(fg[c] * a + bg[c] * (1.0 - a));
            }
        }
        Ok(FloatImage {
            width: self.width,
            height: self.height,
            channels: 3,
            data,
        })
    }

    /// RGB channels composited over a constant color.
    pub fn composite_over_color(&self, color: [f32; 3]) -> FloatImage {
        let mut data = Vec::with_capacity(self.num_pixels() * 3);
        for px in self.data.chunks_exact(self.channels) {
            let a = if self.has_alpha() { px[3] } else { 1.0 };
            for c in 0..3 {
                data.push(px[c] * a + color[c] * (1.0 - a));
            }
        }
        FloatImage {
            width: self.width,
            height: self.height,
            channels: 3,
            data,
        }
    }

    /// Drop the alpha channel without compositing.
    pub fn to_rgb(&self) -> FloatImage {
        if !self.has_alpha() {
            return self.clone();
        }
        let data = self
            .data
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect();
        FloatImage {
            width: self.width,
            height: self.height,
            channels: 3,
            data,
        }
    }

    /// Resize with bilinear filtering.
    pub fn resized(&self, width: u32, height: u32) -> FloatImage {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        let data = if self.has_alpha() {
            let buf: ImageBuffer<Rgba<f32>, Vec<f32>> =
                ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_default();
            image::imageops::resize(&buf, width, height, FilterType::Triangle).into_raw()
        } else {
            let buf: ImageBuffer<Rgb<f32>, Vec<f32>> =
                ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                    .unwrap_or_default();
            image::imageops::resize(&buf, width, height, FilterType::Triangle).into_raw()
        };
        FloatImage {
            width,
            height,
            channels: self.channels,
            data,
        }
    }

    /// Apply `f` to the color channels, leaving alpha untouched.
    pub fn map_color<F: Fn(f32) -> f32>(&self, f: F) -> FloatImage {
        let mut out = self.clone();
        for px in out.data.chunks_exact_mut(self.channels) {
            for v in px.iter_mut().take(3) {
                *v = f(*v);
            }
        }
        out
    }
}

/// Convert an sRGB-encoded value to linear.
#[inline]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Convert a linear value to sRGB encoding.
#[inline]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Load an image as float RGBA (or RGB when the file has no alpha), shrunk by `downscale`.
pub fn load_image<P: AsRef<Path>>(path: P, downscale: u32) -> Result<FloatImage> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AdvIoError::MissingFile {
            path: path.display().to_string(),
        });
    }
    let img = image::open(path)?;
    let downscale = downscale.max(1);
    let img = if downscale > 1 {
        let w = (img.width() / downscale).max(1);
        let h = (img.height() / downscale).max(1);
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    let (width, height) = (img.width(), img.height());
    if img.color().has_alpha() {
        Ok(FloatImage {
            width,
            height,
            channels: 4,
            data: img.to_rgba32f().into_raw(),
        })
    } else {
        Ok(FloatImage {
            width,
            height,
            channels: 3,
            data: img.to_rgb32f().into_raw(),
        })
    }
}

/// Save an image as 8-bit PNG, clamping values to `[0, 1]`.
pub fn save_png<P: AsRef<Path>>(path: P, img: &FloatImage) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes: Vec<u8> = img
        .data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8)
        .collect();
    let color = if img.has_alpha() {
        image::ExtendedColorType::Rgba8
    } else {
        image::ExtendedColorType::Rgb8
    };
    image::save_buffer(path, &bytes, img.width, img.height, color)?;
    Ok(())
}

/// Load background images from a file or from every png/jpg in a directory (sorted).
pub fn load_backgrounds<P: AsRef<Path>>(path: P) -> Result<Vec<FloatImage>> {
    let path = path.as_ref();
    let files: Vec<PathBuf> = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    if files.is_empty() {
        return Err(AdvIoError::MissingFile {
            path: path.display().to_string(),
        });
    }

    let images = files
        .iter()
        .map(|f| load_image(f, 1).map(|img| img.to_rgb()))
        .collect::<Result<Vec<_>>>()?;
    log::info!("Loaded {} background image(s) from {}", images.len(), path.display());
    Ok(images)
}
