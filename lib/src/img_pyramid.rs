use crate::masked_image::MaskedImage;

/// Progressively halved copies of an image, level 0 being the input itself
pub(crate) struct ImagePyramid {
    pub pyramid: Vec<MaskedImage>,
}

impl ImagePyramid {
    /// Keeps halving until the smaller side of the last level is no larger
    /// than the patch radius
    pub fn new(in_img: MaskedImage, radius: u32) -> Self {
        let mut pyramid = vec![in_img];

        loop {
            let last = &pyramid[pyramid.len() - 1];
            if last.width().min(last.height()) <= radius {
                break;
            }

            let next = last.downsample();
            pyramid.push(next);
        }

        Self { pyramid }
    }

    #[inline]
    pub fn level(&self, level: usize) -> &MaskedImage {
        &self.pyramid[level]
    }

    /// Index of the lowest resolution level
    #[inline]
    pub fn coarsest(&self) -> usize {
        self.pyramid.len() - 1
    }
}
