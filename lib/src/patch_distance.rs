use crate::masked_image::{MaskedImage, CHANNELS};

/// The distance between two patches that share nothing in common. Every
/// distance lies in `0..=DSCALE`.
pub const DSCALE: u32 = 65535;

/// Per pixel maximum of the squared differences: value, horizontal and
/// vertical gradient for each of the 3 channels
const SSD_MAX: u64 = 9 * 255 * 255;

#[inline]
fn is_inset(img: &MaskedImage, x: i64, y: i64) -> bool {
    x >= 1 && y >= 1 && x < i64::from(img.width()) - 1 && y < i64::from(img.height()) - 1
}

/// The sample plus its horizontal and vertical half-gradients, each offset
/// by 128. `(x, y)` must be at least 1 pixel away from every edge.
#[inline]
fn features(img: &MaskedImage, x: u32, y: u32, channel: usize) -> [i64; 3] {
    let s = |x, y| i64::from(img.sample(x, y, channel));
    [
        s(x, y),
        128 + (s(x + 1, y) - s(x - 1, y)) / 2,
        128 + (s(x, y + 1) - s(x, y - 1)) / 2,
    ]
}

/// Dissimilarity between the patch of `radius` around `(xs, ys)` in `source`
/// and the one around `(xt, yt)` in `target`.
///
/// Offsets that land on a masked pixel, or within 1 pixel of either image's
/// edge, cost as much as a maximal mismatch.
pub fn patch_distance(
    source: &MaskedImage,
    xs: u32,
    ys: u32,
    target: &MaskedImage,
    xt: u32,
    yt: u32,
    radius: u32,
) -> u32 {
    let r = i64::from(radius);
    let mut distance = 0u64;
    let mut weight_sum = 0u64;

    for dy in -r..=r {
        for dx in -r..=r {
            weight_sum += SSD_MAX;

            let (xks, yks) = (i64::from(xs) + dx, i64::from(ys) + dy);
            let (xkt, ykt) = (i64::from(xt) + dx, i64::from(yt) + dy);

            if !is_inset(source, xks, yks) || !is_inset(target, xkt, ykt) {
                distance += SSD_MAX;
                continue;
            }

            let (xks, yks, xkt, ykt) = (xks as u32, yks as u32, xkt as u32, ykt as u32);

            if source.is_masked(xks, yks) || target.is_masked(xkt, ykt) {
                distance += SSD_MAX;
                continue;
            }

            for channel in 0..CHANNELS {
                let s = features(source, xks, yks, channel);
                let t = features(target, xkt, ykt, channel);

                distance += s
                    .iter()
                    .zip(t.iter())
                    .map(|(a, b)| ((a - b) * (a - b)) as u64)
                    .sum::<u64>();
            }
        }
    }

    (u64::from(DSCALE) * distance / weight_sum).min(u64::from(DSCALE)) as u32
}

#[cfg(test)]
mod test {
    use super::*;

    fn noise(width: u32, height: u32) -> MaskedImage {
        let count = (width * height) as usize;
        let pixels = (0..count * 3)
            .map(|i| ((i * 7919 + i / 3 * 104_729) % 251) as u8)
            .collect();
        MaskedImage::new(width, height, pixels, vec![0; count]).unwrap()
    }

    #[test]
    fn self_distance_is_zero() {
        let img = noise(16, 16);
        for &(x, y) in &[(3, 3), (8, 5), (12, 12)] {
            assert_eq!(patch_distance(&img, x, y, &img, x, y, 2), 0);
        }
    }

    #[test]
    fn masked_and_border_pixels_are_penalized() {
        let mut img = noise(16, 16);
        let clean = img.clone();

        // Touching the image edge forfeits the whole border row of the patch
        let edge = patch_distance(&img, 1, 8, &img, 1, 8, 1);
        assert!(edge > 0);

        img.set_mask(8, 8, true);
        let holed = patch_distance(&img, 8, 8, &clean, 8, 8, 1);
        // One of nine offsets is a full mismatch
        assert_eq!(holed, DSCALE / 9);
    }

    #[test]
    fn fully_masked_patch_is_sentinel() {
        let mut img = noise(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                img.set_mask(x, y, true);
            }
        }
        let clean = noise(8, 8);
        assert_eq!(patch_distance(&img, 4, 4, &clean, 4, 4, 2), DSCALE);
    }

    #[test]
    fn distance_is_bounded_and_ordered() {
        let img = noise(24, 24);
        let mut shifted = img.clone();
        for y in 0..24 {
            for x in 0..24 {
                let v = img.sample(x, y, 0);
                shifted.set_sample(x, y, 0, v.saturating_add(20));
            }
        }

        let near = patch_distance(&img, 10, 10, &shifted, 10, 10, 2);
        let far = patch_distance(&img, 10, 10, &img, 14, 6, 2);
        assert!(near > 0 && near <= DSCALE);
        assert!(far <= DSCALE);
        assert!(patch_distance(&img, 10, 10, &img, 10, 10, 2) < near);
    }
}
