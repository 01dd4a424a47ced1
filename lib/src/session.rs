use crate::*;
use log::info;

/// The rectangle of the input that is handed to the inpainter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Region {
    x: u32,
    y: u32,
    dims: Dims,
}

impl Region {
    fn covering(img: &MaskedImage, padding: Option<u32>) -> Self {
        let full = Self {
            x: 0,
            y: 0,
            dims: img.dimensions(),
        };

        match (padding, img.masked_bounds()) {
            (Some(pad), Some((x, y, width, height))) => {
                let (x0, y0) = (x.saturating_sub(pad), y.saturating_sub(pad));
                let x1 = x.saturating_add(width).saturating_add(pad).min(img.width());
                let y1 = y.saturating_add(height).saturating_add(pad).min(img.height());

                Self {
                    x: x0,
                    y: y0,
                    dims: Dims::new(x1 - x0, y1 - y0),
                }
            }
            _ => full,
        }
    }

    fn is_whole(&self, img: &MaskedImage) -> bool {
        self.x == 0 && self.y == 0 && self.dims == img.dimensions()
    }
}

/// Inpainting session.
///
/// Calling `run()` synthesizes every masked pixel and returns the healed
/// image, consuming the session in the process.
///
/// # Example
/// ```no_run
/// let session = patch_inpaint::Session::builder()
///     .seed(10)
///     .image(&"imgs/photo.jpg")
///     .mask(&"imgs/photo_mask.png")
///     .build().expect("failed to build session");
///
/// let inpainted = session.run();
/// inpainted.save("healed.png").expect("failed to save image");
/// ```
pub struct Session {
    input: MaskedImage,
    region: Region,
    params: Parameters,
}

impl Session {
    /// Creates a new session with default parameters.
    pub fn builder<'a>() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// Runs the inpainter and outputs the healed image.
    pub fn run(self) -> InpaintedImage {
        let holes = self.input.masked_count();
        info!(
            "inpainting {} pixels of a {}x{} image, region {}x{} at ({}, {})",
            holes,
            self.input.width(),
            self.input.height(),
            self.region.dims.width,
            self.region.dims.height,
            self.region.x,
            self.region.y
        );

        if holes == 0 {
            return InpaintedImage {
                image: self.input.into_rgb_image(),
            };
        }

        let inpainter = Inpainter::new(
            self.params.patch_radius,
            self.params.seed,
            self.params.thread_count(),
        );

        let mut output = self.input;
        let Region { x, y, dims } = self.region;

        let synthesized = if self.region.is_whole(&output) {
            inpainter.inpaint(&output)
        } else {
            inpainter.inpaint(&output.crop(x, y, dims.width, dims.height))
        };

        output.paste(&synthesized, x, y, self.params.keep_known_pixels);

        InpaintedImage {
            image: output.into_rgb_image(),
        }
    }
}

/// Builds a session by setting parameters and adding the input image and
/// mask, calling `build` will check all of the provided inputs to verify that
/// inpainting can run on them
#[derive(Default)]
pub struct SessionBuilder<'a> {
    image: Option<ImageSource<'a>>,
    mask: Option<ImageSource<'a>>,
    masked_image: Option<MaskedImage>,
    params: Parameters,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// The image to heal.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let session = patch_inpaint::Session::builder()
    ///     .image(&"imgs/photo.jpg")
    ///     .mask(&"imgs/photo_mask.png")
    ///     .build().expect("failed to build session");
    /// ```
    pub fn image<I: Into<ImageSource<'a>>>(mut self, image: I) -> Self {
        self.image = Some(image.into());
        self
    }

    /// The hole mask, which must be the same size as the image. Any pixel
    /// with a non-zero luma is synthesized, black pixels are kept.
    pub fn mask<I: Into<ImageSource<'a>>>(mut self, mask: I) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// Uses an already assembled image and mask instead of `image` and `mask`
    pub fn masked_image(mut self, img: MaskedImage) -> Self {
        self.masked_image = Some(img);
        self
    }

    /// Half the side of the square patches that are compared and copied.
    ///
    /// Larger patches capture larger structures but blur fine detail.
    ///
    /// Default: 2
    pub fn patch_radius(mut self, radius: u32) -> Self {
        self.params.patch_radius = radius;
        self
    }

    /// Changes the seed of the random search.
    ///
    /// The same inputs and seed always produce the same output.
    ///
    /// Default: 0
    pub fn seed(mut self, value: u64) -> Self {
        self.params.seed = value;
        self
    }

    /// Only inpaint the bounding box of the mask, grown by `padding` pixels
    /// on every side, instead of the whole image. Replacement patches are
    /// then only sourced from within that box.
    ///
    /// Default: the whole image
    pub fn crop_padding(mut self, padding: u32) -> Self {
        self.params.crop_padding = Some(padding);
        self
    }

    /// When true, only pixels masked in the input are replaced in the output.
    /// When false, known pixels near the hole may be slightly adjusted as
    /// well, exactly as the synthesis left them.
    ///
    /// Default: true
    pub fn keep_known_pixels(mut self, keep: bool) -> Self {
        self.params.keep_known_pixels = keep;
        self
    }

    /// Controls the maximum number of threads that will be spawned at any one
    /// time in parallel.
    ///
    /// The output does not depend on this number.
    ///
    /// Default: The number of logical cores on this system.
    pub fn max_thread_count(mut self, count: usize) -> Self {
        self.params.max_thread_count = Some(count);
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or input
    /// images were specified.
    pub fn build(self) -> Result<Session, Error> {
        self.check_parameters_validity()?;

        let input = match self.masked_image {
            Some(img) => img,
            None => {
                let image = load_image(self.image.ok_or(Error::MissingInput("image"))?)?;
                let mask = load_mask(self.mask.ok_or(Error::MissingInput("mask"))?)?;
                MaskedImage::from_images(&image, &mask)?
            }
        };

        let region = Region::covering(&input, self.params.crop_padding);
        check_radius(self.params.patch_radius, region.dims)?;

        Ok(Session {
            input,
            region,
            params: self.params,
        })
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        if let Some(max_count) = self.params.max_thread_count {
            if max_count == 0 {
                return Err(Error::InvalidRange(errors::InvalidRange {
                    min: 1.0,
                    max: 1024.0,
                    value: max_count as f32,
                    name: "max-thread-count",
                }));
            }
        }

        Ok(())
    }
}

/// A patch must fit well within the region it is searched in, so the upper
/// bound depends on the size of that region
fn check_radius(radius: u32, dims: Dims) -> Result<(), Error> {
    let side = dims.width.min(dims.height);
    if radius == 0 || radius.saturating_mul(2) >= side {
        return Err(Error::InvalidRange(errors::InvalidRange {
            min: 1.0,
            max: (side.saturating_sub(1) / 2) as f32,
            value: radius as f32,
            name: "patch-radius",
        }));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn region_is_padded_and_clamped() {
        let mut img = MaskedImage::blank(50, 40);
        img.set_mask(3, 20, true);
        img.set_mask(10, 25, true);

        assert_eq!(
            Region::covering(&img, Some(5)),
            Region {
                x: 0,
                y: 15,
                dims: Dims::new(16, 16),
            }
        );
        assert!(Region::covering(&img, None).is_whole(&img));

        let unmasked = MaskedImage::blank(8, 8);
        assert!(Region::covering(&unmasked, Some(2)).is_whole(&unmasked));
    }

    #[test]
    fn radius_must_fit() {
        assert!(check_radius(2, Dims::new(5, 9)).is_ok());
        assert!(matches!(
            check_radius(3, Dims::new(6, 90)),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn radius_range_reflects_region() {
        for &radius in &[0, 40] {
            match check_radius(radius, Dims::new(90, 21)) {
                Err(Error::InvalidRange(range)) => {
                    assert_eq!(range.min, 1.0);
                    assert_eq!(range.max, 10.0);
                    assert_eq!(range.value, radius as f32);
                }
                _ => panic!("radius {} should be rejected", radius),
            }
        }

        let res = Session::builder()
            .masked_image(MaskedImage::blank(30, 12))
            .patch_radius(0)
            .build();
        match res {
            Err(Error::InvalidRange(range)) => assert_eq!(range.max, 5.0),
            _ => panic!("a zero radius should be rejected"),
        }
    }
}
