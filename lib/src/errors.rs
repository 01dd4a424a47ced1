use std::fmt;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

#[derive(Debug)]
pub struct SizeMismatch {
    pub(crate) image: (u32, u32),
    pub(crate) mask: (u32, u32),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the mask size ({}x{}) must match the image size ({}x{})",
            self.mask.0, self.mask.1, self.image.0, self.image.1
        )
    }
}

#[derive(Debug)]
pub struct BufferLength {
    pub(crate) name: &'static str,
    pub(crate) expected: usize,
    pub(crate) actual: usize,
}

impl fmt::Display for BufferLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the {} buffer holds {} bytes, but {} are required",
            self.name, self.actual, self.expected
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to load/save
    Image(image::ImageError),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// The mask must cover exactly the same extent as the image
    SizeMismatch(SizeMismatch),
    /// A raw pixel or mask buffer does not match the stated dimensions
    BufferLength(BufferLength),
    /// The image has a zero width or height
    EmptyImage,
    /// A required input (the image or the mask) was never provided
    MissingInput(&'static str),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::SizeMismatch(sm) => write!(f, "{}", sm),
            Self::BufferLength(bl) => write!(f, "{}", bl),
            Self::EmptyImage => write!(f, "the image must have a non-zero width and height"),
            Self::MissingInput(what) => write!(f, "no {} was provided", what),
            Self::Io(io) => write!(f, "{}", io),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}
