//! Image loading and pixel access.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA frame.
//! - [`Pixel`], a single 8-bit RGBA pixel value.
//! - [`Rect`], integer-valued rectangles representing parts of an image.

mod rect;


use std::{fmt, ops::Index, path::Path};

use anyhow::bail;
use image::{imageops::FilterType, ImageBuffer, Rgba, RgbaImage};

use crate::resolution::Resolution;

pub use rect::*;

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg" | "JPG" | "JPEG") => Ok(Self::Jpeg),
            Some("png" | "PNG") => Ok(Self::Png),
            _ => bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Returns whether `path` has an extension that [`Image::load`] understands.
pub(crate) fn is_supported_path(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())?.to_rgba8();
        Ok(Self { buf })
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        match ImageFormat::from_path(path)? {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => {
                image::DynamicImage::ImageRgba8(self.buf.clone())
                    .to_rgb8()
                    .save(path)?;
            }
            ImageFormat::Png => self.buf.save(path)?,
        }
        Ok(())
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image from raw, tightly packed RGBA data.
    ///
    /// # Panics
    ///
    /// This method will panic if `data` does not contain exactly 4 bytes per pixel of `res`.
    pub fn from_rgba8(res: Resolution, data: &[u8]) -> Self {
        let expected = res.num_pixels() * 4;
        assert_eq!(
            data.len() as u64,
            expected,
            "image data does not match resolution {res}"
        );
        let buf = ImageBuffer::from_raw(res.width(), res.height(), data.to_vec())
            .expect("buffer size was checked above");
        Self { buf }
    }

    /// Creates an image by computing each pixel with a closure.
    pub fn from_fn(res: Resolution, mut f: impl FnMut(u32, u32) -> Pixel) -> Self {
        Self {
            buf: ImageBuffer::from_fn(res.width(), res.height(), |x, y| Rgba(f(x, y).0)),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Pixel {
        Pixel(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, pixel: Pixel) {
        self.buf[(x, y)] = Rgba(pixel.0);
    }

    /// Returns an iterator over all pixels in row-major order, along with their coordinates.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, Pixel)> + '_ {
        self.buf
            .enumerate_pixels()
            .map(|(x, y, rgba)| (x, y, Pixel(rgba.0)))
    }

    /// Resizes this image to `res`, stretching it if the aspect ratio differs.
    ///
    /// This uses nearest neighbor interpolation, which is good enough to feed neural networks.
    pub fn resize(&self, res: Resolution) -> Image {
        Image {
            buf: image::imageops::resize(&self.buf, res.width(), res.height(), FilterType::Nearest),
        }
    }

    /// Fills the area of `rect` that lies inside the image with `pixel`.
    pub fn fill_rect(&mut self, rect: Rect, pixel: Pixel) {
        let Some(rect) = rect.clamp_to(self.resolution()) else {
            return;
        };
        for y in rect.y()..rect.y() + rect.height() as i32 {
            for x in rect.x()..rect.x() + rect.width() as i32 {
                self.set(x as u32, y as u32, pixel);
            }
        }
    }

    /// Returns the raw RGBA bytes of this image, in row-major order.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({})", self.resolution())
    }
}

/// An 8-bit RGBA pixel.
///
/// Pixels are in the non-linear sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Pixel(pub [u8; 4]);

impl Pixel {
    /// Fully transparent black (all components are 0).
    pub const NONE: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Pixel {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}
