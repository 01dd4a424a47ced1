//! A color raster paired 1:1 with a mask of unknown ("hole") pixels

use crate::{errors, Dims, Error};

/// Separable weights used by [`MaskedImage::downsample`], centered between
/// the 3rd and 4th tap.
const DOWNSAMPLE_KERNEL: [u32; 6] = [1, 5, 10, 10, 5, 1];

pub(crate) const CHANNELS: usize = 3;

/// An 8-bit, 3 channel image where every pixel is either known or masked.
///
/// The pixel and mask buffers always describe the same `width x height`
/// extent. Sample values of masked pixels are kept, but nothing in the
/// synthesis reads them as color.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskedImage {
    dims: Dims,
    pixels: Vec<u8>,
    mask: Vec<u8>,
}

impl MaskedImage {
    /// Creates a masked image from raw buffers. `pixels` holds 3 samples per
    /// pixel in row-major order, `mask` holds 1 byte per pixel where any
    /// non-zero value marks a hole.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, mask: Vec<u8>) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage);
        }

        let count = width as usize * height as usize;
        if pixels.len() != count * CHANNELS {
            return Err(Error::BufferLength(errors::BufferLength {
                name: "pixel",
                expected: count * CHANNELS,
                actual: pixels.len(),
            }));
        }

        if mask.len() != count {
            return Err(Error::BufferLength(errors::BufferLength {
                name: "mask",
                expected: count,
                actual: mask.len(),
            }));
        }

        Ok(Self {
            dims: Dims::new(width, height),
            pixels,
            mask,
        })
    }

    /// A black, fully known image. Callers guarantee a non-zero size.
    pub(crate) fn blank(width: u32, height: u32) -> Self {
        let count = width as usize * height as usize;
        Self {
            dims: Dims::new(width, height),
            pixels: vec![0; count * CHANNELS],
            mask: vec![0; count],
        }
    }

    /// Pairs a color image with a mask of the same size, any non-zero luma in
    /// the mask marks a hole
    pub fn from_images(image: &image::RgbImage, mask: &image::GrayImage) -> Result<Self, Error> {
        if image.dimensions() != mask.dimensions() {
            return Err(Error::SizeMismatch(errors::SizeMismatch {
                image: image.dimensions(),
                mask: mask.dimensions(),
            }));
        }

        let (width, height) = image.dimensions();
        Self::new(
            width,
            height,
            image.as_raw().clone(),
            mask.as_raw().iter().map(|m| u8::from(*m != 0)).collect(),
        )
    }

    /// Converts into a plain color image, dropping the mask
    pub fn into_rgb_image(self) -> image::RgbImage {
        let Dims { width, height } = self.dims;
        // The buffer length is an invariant of this type
        image::RgbImage::from_raw(width, height, self.pixels)
            .unwrap_or_else(|| image::RgbImage::new(width, height))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.dims.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.dims.height
    }

    #[inline]
    pub fn dimensions(&self) -> Dims {
        self.dims
    }

    /// The raw row-major samples, 3 per pixel
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The raw row-major mask, 1 byte per pixel
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.dims.width as usize + x as usize
    }

    #[inline]
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> u8 {
        self.pixels[self.index(x, y) * CHANNELS + channel]
    }

    #[inline]
    pub fn set_sample(&mut self, x: u32, y: u32, channel: usize, value: u8) {
        let i = self.index(x, y) * CHANNELS + channel;
        self.pixels[i] = value;
    }

    #[inline]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.index(x, y) * CHANNELS;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    #[inline]
    pub(crate) fn set_pixel(&mut self, x: u32, y: u32, value: [u8; 3]) {
        let i = self.index(x, y) * CHANNELS;
        self.pixels[i..i + CHANNELS].copy_from_slice(&value);
    }

    #[inline]
    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.mask[self.index(x, y)] != 0
    }

    #[inline]
    pub fn set_mask(&mut self, x: u32, y: u32, masked: bool) {
        let i = self.index(x, y);
        self.mask[i] = u8::from(masked);
    }

    /// Marks every pixel as known
    pub fn clear_mask(&mut self) {
        self.mask.iter_mut().for_each(|m| *m = 0);
    }

    pub fn masked_count(&self) -> usize {
        self.mask.iter().filter(|m| **m != 0).count()
    }

    /// True if any pixel in the `(2 * radius + 1)^2` square around `(x, y)`,
    /// clipped to the image, is masked
    pub fn contains_masked(&self, x: u32, y: u32, radius: u32) -> bool {
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius).min(self.dims.width - 1);
        let y1 = (y + radius).min(self.dims.height - 1);

        (y0..=y1).any(|yy| {
            let row = self.index(x0, yy);
            self.mask[row..=row + (x1 - x0) as usize]
                .iter()
                .any(|m| *m != 0)
        })
    }

    /// Halves the image in both dimensions with a 6x6 weighted kernel.
    ///
    /// Masked input pixels never contribute. An output pixel that receives no
    /// contribution at all is itself masked.
    pub(crate) fn downsample(&self) -> Self {
        let (width, height) = (self.dims.width as i64, self.dims.height as i64);
        let mut out = Self::blank(self.dims.width / 2, self.dims.height / 2);

        for oy in 0..out.height() {
            for ox in 0..out.width() {
                let (x, y) = (i64::from(ox) * 2, i64::from(oy) * 2);
                let mut color = [0u32; 3];
                let mut ksum = 0u32;

                for (ky, wy) in DOWNSAMPLE_KERNEL.iter().enumerate() {
                    let yk = y + ky as i64 - 2;
                    if yk < 0 || yk >= height {
                        continue;
                    }

                    for (kx, wx) in DOWNSAMPLE_KERNEL.iter().enumerate() {
                        let xk = x + kx as i64 - 2;
                        if xk < 0 || xk >= width {
                            continue;
                        }

                        let (xk, yk) = (xk as u32, yk as u32);
                        if self.is_masked(xk, yk) {
                            continue;
                        }

                        let k = wx * wy;
                        let px = self.pixel(xk, yk);
                        for c in 0..CHANNELS {
                            color[c] += k * u32::from(px[c]);
                        }
                        ksum += k;
                    }
                }

                if ksum > 0 {
                    out.set_pixel(
                        ox,
                        oy,
                        [
                            (color[0] / ksum) as u8,
                            (color[1] / ksum) as u8,
                            (color[2] / ksum) as u8,
                        ],
                    );
                } else {
                    out.set_mask(ox, oy, true);
                }
            }
        }

        out
    }

    /// Nearest-neighbor resize to `width x height`, copying both the samples
    /// and the mask state of the source pixel
    pub(crate) fn upsample(&self, width: u32, height: u32) -> Self {
        let mut out = Self::blank(width, height);
        let (sw, sh) = (u64::from(self.dims.width), u64::from(self.dims.height));

        for y in 0..height {
            let ys = (u64::from(y) * sh / u64::from(height)) as u32;
            for x in 0..width {
                let xs = (u64::from(x) * sw / u64::from(width)) as u32;
                out.set_pixel(x, y, self.pixel(xs, ys));
                out.set_mask(x, y, self.is_masked(xs, ys));
            }
        }

        out
    }

    /// Bounding box `(x, y, width, height)` of all masked pixels
    pub(crate) fn masked_bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;

        for y in 0..self.dims.height {
            for x in 0..self.dims.width {
                if !self.is_masked(x, y) {
                    continue;
                }

                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
    }

    /// Copies out a sub-region, the region must lie within the image
    pub(crate) fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let mut out = Self::blank(width, height);
        for oy in 0..height {
            for ox in 0..width {
                out.set_pixel(ox, oy, self.pixel(x + ox, y + oy));
                out.set_mask(ox, oy, self.is_masked(x + ox, y + oy));
            }
        }
        out
    }

    /// Writes `other` back at `(x, y)`. When `holes_only` is set, only pixels
    /// that are masked in `self` are replaced.
    pub(crate) fn paste(&mut self, other: &Self, x: u32, y: u32, holes_only: bool) {
        for oy in 0..other.height() {
            for ox in 0..other.width() {
                let (tx, ty) = (x + ox, y + oy);
                if holes_only && !self.is_masked(tx, ty) {
                    continue;
                }
                self.set_pixel(tx, ty, other.pixel(ox, oy));
                self.set_mask(tx, ty, other.is_masked(ox, oy));
            }
        }
    }
}
