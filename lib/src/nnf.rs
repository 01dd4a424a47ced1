use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::{
    masked_image::MaskedImage,
    par,
    patch_distance::{patch_distance, DSCALE},
    Dims,
};

/// How many times a degenerate (`DSCALE`) random link is re-rolled before the
/// sentinel is accepted and left for refinement
const MAX_SEED_RETRIES: u32 = 20;

/// Best known match of one input patch: the center of the output patch and
/// its distance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) x: u32,
    pub(crate) y: u32,
    pub(crate) distance: u32,
}

impl Link {
    const UNSEEDED: Self = Self {
        x: 0,
        y: 0,
        distance: DSCALE,
    };
}

/// The two rasters a field maps between. The field owns neither.
#[derive(Clone, Copy)]
pub(crate) struct Mapping<'a> {
    pub(crate) input: &'a MaskedImage,
    pub(crate) output: &'a MaskedImage,
    pub(crate) radius: u32,
}

impl<'a> Mapping<'a> {
    #[inline]
    fn distance(&self, x: u32, y: u32, xp: u32, yp: u32) -> u32 {
        patch_distance(self.input, x, y, self.output, xp, yp, self.radius)
    }

    fn random_link(&self, rng: &mut Pcg32) -> (u32, u32) {
        (
            rng.gen_range(0..self.output.width()),
            rng.gen_range(0..self.output.height()),
        )
    }
}

/// A nearest-neighbor field from every patch of an input raster to a patch
/// of an output raster, stored as one flat row-major buffer.
pub(crate) struct NearestNeighborField {
    dims: Dims,
    links: Vec<Link>,
}

impl NearestNeighborField {
    /// An unseeded field for an input of `dims`
    pub(crate) fn new(dims: Dims) -> Self {
        Self {
            dims,
            links: vec![Link::UNSEEDED; dims.width as usize * dims.height as usize],
        }
    }

    #[inline]
    pub(crate) fn dimensions(&self) -> Dims {
        self.dims
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.dims.width as usize + x as usize
    }

    #[inline]
    pub(crate) fn get(&self, x: u32, y: u32) -> Link {
        self.links[self.index(x, y)]
    }

    #[inline]
    pub(crate) fn set(&mut self, x: u32, y: u32, link: Link) {
        let i = self.index(x, y);
        self.links[i] = link;
    }

    /// Maps `(x, y)` onto itself with a perfect score
    #[inline]
    pub(crate) fn pin_identity(&mut self, x: u32, y: u32) {
        self.set(x, y, Link { x, y, distance: 0 });
    }

    /// Every link in row-major order
    pub(crate) fn links(&self) -> &[Link] {
        &self.links
    }

    /// Points every pixel at a uniformly random output location
    pub(crate) fn randomize(&mut self, mapping: Mapping<'_>, rng: &mut Pcg32, max_threads: usize) {
        debug_assert_eq!(mapping.input.dimensions(), self.dims);

        for link in self.links.iter_mut() {
            let (x, y) = mapping.random_link(rng);
            *link = Link {
                x,
                y,
                distance: DSCALE,
            };
        }

        self.recompute_distances(mapping, rng, max_threads);
    }

    /// Seeds this field from the field of the next coarser level, scaling
    /// the coarse links up by the integer ratio between the two levels
    pub(crate) fn seed_from(
        &mut self,
        prior: &Self,
        mapping: Mapping<'_>,
        rng: &mut Pcg32,
        max_threads: usize,
    ) {
        debug_assert_eq!(mapping.input.dimensions(), self.dims);

        let prior_dims = prior.dimensions();
        let fx = (self.dims.width / prior_dims.width).max(1);
        let fy = (self.dims.height / prior_dims.height).max(1);
        let (max_x, max_y) = (mapping.output.width() - 1, mapping.output.height() - 1);

        for y in 0..self.dims.height {
            for x in 0..self.dims.width {
                let coarse = prior.get(
                    (x / fx).min(prior_dims.width - 1),
                    (y / fy).min(prior_dims.height - 1),
                );

                self.set(
                    x,
                    y,
                    Link {
                        x: (coarse.x * fx).min(max_x),
                        y: (coarse.y * fy).min(max_y),
                        distance: DSCALE,
                    },
                );
            }
        }

        self.recompute_distances(mapping, rng, max_threads);
    }

    /// Scores every link, re-rolling degenerate ones a bounded number of times.
    ///
    /// Rows are processed in parallel, each with its own generator derived from
    /// a single draw of `rng`, so the result does not depend on the thread count.
    fn recompute_distances(&mut self, mapping: Mapping<'_>, rng: &mut Pcg32, max_threads: usize) {
        let base_seed: u64 = rng.gen();
        let width = self.dims.width as usize;

        par::for_each_band(&mut self.links, width, max_threads, |first_row, band| {
            for (i, row) in band.chunks_mut(width).enumerate() {
                let y = (first_row + i) as u32;
                let mut row_rng = Pcg32::seed_from_u64(base_seed.wrapping_add(u64::from(y)));

                for (x, link) in row.iter_mut().enumerate() {
                    let x = x as u32;
                    link.distance = mapping.distance(x, y, link.x, link.y);

                    let mut attempts = 0;
                    while link.distance == DSCALE && attempts < MAX_SEED_RETRIES {
                        let (xp, yp) = mapping.random_link(&mut row_rng);
                        *link = Link {
                            x: xp,
                            y: yp,
                            distance: mapping.distance(x, y, xp, yp),
                        };
                        attempts += 1;
                    }
                }
            }
        });
    }

    /// PatchMatch refinement: `passes` rounds of a forward scanline sweep
    /// followed by a reverse one. Perfect links are left alone.
    ///
    /// Each link may read the neighbor updated just before it, so this is
    /// strictly sequential.
    pub(crate) fn minimize(&mut self, mapping: Mapping<'_>, passes: u32, rng: &mut Pcg32) {
        debug_assert_eq!(mapping.input.dimensions(), self.dims);
        let Dims { width, height } = self.dims;

        for _ in 0..passes {
            for y in 0..height {
                for x in 0..width {
                    if self.get(x, y).distance > 0 {
                        self.improve_link(mapping, x, y, 1, rng);
                    }
                }
            }

            for y in (0..height).rev() {
                for x in (0..width).rev() {
                    if self.get(x, y).distance > 0 {
                        self.improve_link(mapping, x, y, -1, rng);
                    }
                }
            }
        }
    }

    fn improve_link(&mut self, mapping: Mapping<'_>, x: u32, y: u32, dir: i64, rng: &mut Pcg32) {
        let (out_w, out_h) = (
            i64::from(mapping.output.width()),
            i64::from(mapping.output.height()),
        );
        let mut best = self.get(x, y);

        let consider = |best: &mut Link, cx: i64, cy: i64| {
            let (cx, cy) = (cx as u32, cy as u32);
            let distance = mapping.distance(x, y, cx, cy);
            if distance < best.distance {
                *best = Link {
                    x: cx,
                    y: cy,
                    distance,
                };
            }
        };

        // propagate from the vertical neighbor
        let ny = i64::from(y) - dir;
        if ny >= 0 && ny < i64::from(self.dims.height) {
            let neighbor = self.get(x, ny as u32);
            let cy = i64::from(neighbor.y) + dir;
            if cy >= 0 && cy < out_h {
                consider(&mut best, i64::from(neighbor.x), cy);
            }
        }

        // propagate from the horizontal neighbor
        let nx = i64::from(x) - dir;
        if nx >= 0 && nx < i64::from(self.dims.width) {
            let neighbor = self.get(nx as u32, y);
            let cx = i64::from(neighbor.x) + dir;
            if cx >= 0 && cx < out_w {
                consider(&mut best, cx, i64::from(neighbor.y));
            }
        }

        // random search in a window halving around the current best
        let mut window = out_w;
        while window > 0 {
            let cx = (i64::from(best.x) + rng.gen_range(-window..window)).clamp(0, out_w - 1);
            let cy = (i64::from(best.y) + rng.gen_range(-window..window)).clamp(0, out_h - 1);
            consider(&mut best, cx, cy);
            window /= 2;
        }

        self.set(x, y, best);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn noise(width: u32, height: u32, salt: usize) -> MaskedImage {
        let count = (width * height) as usize;
        let pixels = (0..count * 3)
            .map(|i| (((i + salt) * 7919 + i / 3 * 104_729) % 251) as u8)
            .collect();
        MaskedImage::new(width, height, pixels, vec![0; count]).unwrap()
    }

    fn assert_valid(nnf: &NearestNeighborField, mapping: Mapping<'_>) {
        for y in 0..nnf.dimensions().height {
            for x in 0..nnf.dimensions().width {
                let link = nnf.get(x, y);
                assert!(link.x < mapping.output.width());
                assert!(link.y < mapping.output.height());
                assert!(link.distance <= DSCALE);
                assert_eq!(link.distance, mapping.distance(x, y, link.x, link.y));
            }
        }
    }

    #[test]
    fn randomize_stays_in_bounds() {
        let input = noise(20, 12, 0);
        let output = noise(9, 31, 5);
        let mapping = Mapping {
            input: &input,
            output: &output,
            radius: 2,
        };

        let mut nnf = NearestNeighborField::new(input.dimensions());
        nnf.randomize(mapping, &mut Pcg32::seed_from_u64(3), 2);
        assert_valid(&nnf, mapping);
    }

    #[test]
    fn randomize_ignores_thread_count() {
        let input = noise(32, 32, 1);
        let output = noise(32, 32, 2);
        let mapping = Mapping {
            input: &input,
            output: &output,
            radius: 2,
        };

        let mut single = NearestNeighborField::new(input.dimensions());
        single.randomize(mapping, &mut Pcg32::seed_from_u64(9), 1);
        let mut multi = NearestNeighborField::new(input.dimensions());
        multi.randomize(mapping, &mut Pcg32::seed_from_u64(9), 4);

        assert_eq!(single.links(), multi.links());
    }

    #[test]
    fn degenerate_output_keeps_sentinel() {
        let input = noise(10, 10, 0);
        let mut output = noise(10, 10, 0);
        for y in 0..10 {
            for x in 0..10 {
                output.set_mask(x, y, true);
            }
        }
        let mapping = Mapping {
            input: &input,
            output: &output,
            radius: 1,
        };

        let mut nnf = NearestNeighborField::new(input.dimensions());
        nnf.randomize(mapping, &mut Pcg32::seed_from_u64(0), 1);
        assert_valid(&nnf, mapping);
        assert!(nnf.links().iter().all(|l| l.distance == DSCALE));
    }

    #[test]
    fn seed_from_scales_coarse_links() {
        let coarse = noise(8, 8, 0);
        let fine = noise(16, 16, 0);

        let mut prior = NearestNeighborField::new(coarse.dimensions());
        for y in 0..8 {
            for x in 0..8 {
                prior.pin_identity(x, y);
            }
        }

        let mapping = Mapping {
            input: &fine,
            output: &fine,
            radius: 1,
        };
        let mut nnf = NearestNeighborField::new(fine.dimensions());
        nnf.seed_from(&prior, mapping, &mut Pcg32::seed_from_u64(1), 1);

        assert_valid(&nnf, mapping);
        for y in 0..16 {
            for x in 0..16 {
                let link = nnf.get(x, y);
                assert_eq!((link.x, link.y), (x / 2 * 2, y / 2 * 2));
            }
        }
    }

    #[test]
    fn minimize_never_worsens_links() {
        let img = noise(24, 24, 4);
        let mapping = Mapping {
            input: &img,
            output: &img,
            radius: 2,
        };

        let mut rng = Pcg32::seed_from_u64(17);
        let mut nnf = NearestNeighborField::new(img.dimensions());
        nnf.randomize(mapping, &mut rng, 1);
        let before: Vec<Link> = nnf.links().to_vec();

        nnf.minimize(mapping, 2, &mut rng);
        assert_valid(&nnf, mapping);

        let mut improved = 0;
        for (b, a) in before.iter().zip(nnf.links()) {
            assert!(a.distance <= b.distance);
            if a.distance < b.distance {
                improved += 1;
            }
        }
        assert!(improved > 0);
    }

    #[test]
    fn pinned_links_are_not_refined() {
        let img = noise(12, 12, 0);
        let other = noise(12, 12, 3);
        let mapping = Mapping {
            input: &img,
            output: &other,
            radius: 1,
        };

        let mut rng = Pcg32::seed_from_u64(2);
        let mut nnf = NearestNeighborField::new(img.dimensions());
        nnf.randomize(mapping, &mut rng, 1);
        nnf.pin_identity(5, 6);
        nnf.minimize(mapping, 1, &mut rng);

        assert_eq!(
            nnf.get(5, 6),
            Link {
                x: 5,
                y: 6,
                distance: 0
            }
        );
    }
}
