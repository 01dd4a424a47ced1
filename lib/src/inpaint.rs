//! Coarse to fine Expectation-Maximization over a pair of nearest-neighbor
//! fields, one from the source to the synthesized target and one back.

use log::{debug, trace};
use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::{
    img_pyramid::ImagePyramid,
    masked_image::{MaskedImage, CHANNELS},
    nnf::{Mapping, NearestNeighborField},
    par,
    patch_distance::DSCALE,
    Dims,
};

/// Upper bound on the NNF passes of a single EM iteration
const MAX_NNF_PASSES: u32 = 7;

/// Vote weight sampled at every 1% of `DSCALE`, zero beyond the last point
const SIMILARITY_CURVE: [f64; 11] = [
    1.0, 0.99, 0.96, 0.83, 0.38, 0.11, 0.02, 0.005, 0.0006, 0.0001, 0.0,
];

#[inline]
fn em_iterations(level: usize) -> u32 {
    1 + 2 * level as u32
}

#[inline]
fn nnf_passes(level: usize) -> u32 {
    MAX_NNF_PASSES.min(1 + level as u32)
}

/// Patch distance to vote weight, interpolated from `SIMILARITY_CURVE`
pub(crate) struct SimilarityTable {
    weights: Vec<f64>,
}

impl SimilarityTable {
    pub(crate) fn new() -> Self {
        let len = DSCALE as usize + 1;
        let at = |i: usize| SIMILARITY_CURVE.get(i).copied().unwrap_or(0.0);

        let weights = (0..len)
            .map(|i| {
                let t = 100.0 * i as f64 / len as f64;
                let j = t as usize;
                let (vj, vk) = (at(j), at(j + 1));
                vj + (t - j as f64) * (vk - vj)
            })
            .collect();

        Self { weights }
    }

    #[inline]
    pub(crate) fn get(&self, distance: u32) -> f64 {
        self.weights[distance as usize]
    }
}

#[derive(Clone, Copy, Default)]
struct Vote {
    color: [f64; 3],
    weight: f64,
}

/// Weighted color sums for one EM iteration, sized to the target
struct VoteBuffer {
    dims: Dims,
    cells: Vec<Vote>,
}

impl VoteBuffer {
    fn new(dims: Dims) -> Self {
        Self {
            dims,
            cells: vec![Vote::default(); dims.width as usize * dims.height as usize],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    SourceToTarget,
    TargetToSource,
}

/// Everything the synthesis holds for one pyramid level. The source is the
/// pyramid's, the target and both fields belong to the level.
struct Level {
    index: usize,
    target: MaskedImage,
    /// Pixels whose source patch is entirely known
    anchors: Vec<bool>,
    source_to_target: NearestNeighborField,
    target_to_source: NearestNeighborField,
}

impl Level {
    fn new(
        index: usize,
        source: &MaskedImage,
        target: MaskedImage,
        source_to_target: NearestNeighborField,
        target_to_source: NearestNeighborField,
        radius: u32,
    ) -> Self {
        let Dims { width, height } = source.dimensions();
        let anchors = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| !source.contains_masked(x, y, radius))
            .collect();

        Self {
            index,
            target,
            anchors,
            source_to_target,
            target_to_source,
        }
    }

    /// Known regions map onto themselves, in both directions
    fn constrain(&mut self) {
        let width = self.source_to_target.dimensions().width as usize;
        for (i, _) in self.anchors.iter().enumerate().filter(|(_, a)| **a) {
            let (x, y) = ((i % width) as u32, (i / width) as u32);
            self.source_to_target.pin_identity(x, y);
            self.target_to_source.pin_identity(x, y);
        }
    }
}

/// One transition of the synthesis. Each stage owns the level it works on
/// and hands it to the next.
enum Stage {
    Seed,
    Refine(Level, u32),
    Upscale(Level),
    Done(MaskedImage),
}

pub(crate) struct Inpainter {
    radius: u32,
    seed: u64,
    max_threads: usize,
    similarity: SimilarityTable,
}

impl Inpainter {
    pub(crate) fn new(radius: u32, seed: u64, max_threads: usize) -> Self {
        Self {
            radius,
            seed,
            max_threads: max_threads.max(1),
            similarity: SimilarityTable::new(),
        }
    }

    /// Synthesizes every masked pixel of `input`. The result has the same
    /// dimensions and no masked pixels.
    pub(crate) fn inpaint(&self, input: &MaskedImage) -> MaskedImage {
        let pyramid = ImagePyramid::new(input.clone(), self.radius);
        let mut rng = Pcg32::seed_from_u64(self.seed);

        debug!(
            "built a {} level pyramid from {}x{}",
            pyramid.pyramid.len(),
            input.width(),
            input.height()
        );

        let mut stage = Stage::Seed;
        loop {
            stage = match stage {
                Stage::Seed => Stage::Refine(self.seed_level(&pyramid, &mut rng), 0),
                Stage::Refine(level, iteration) => {
                    self.refine(&pyramid, level, iteration, &mut rng)
                }
                Stage::Upscale(level) => Stage::Refine(self.upscale(&pyramid, level, &mut rng), 0),
                Stage::Done(target) => return target,
            };
        }
    }

    /// The coarsest target starts as a copy of its source, treated as known
    fn seed_level(&self, pyramid: &ImagePyramid, rng: &mut Pcg32) -> Level {
        let index = pyramid.coarsest();
        let source = pyramid.level(index);

        let mut target = source.clone();
        target.clear_mask();

        let mut source_to_target = NearestNeighborField::new(source.dimensions());
        source_to_target.randomize(self.mapping(source, &target), rng, self.max_threads);

        let mut target_to_source = NearestNeighborField::new(target.dimensions());
        target_to_source.randomize(self.mapping(&target, source), rng, self.max_threads);

        Level::new(
            index,
            source,
            target,
            source_to_target,
            target_to_source,
            self.radius,
        )
    }

    fn refine(
        &self,
        pyramid: &ImagePyramid,
        mut level: Level,
        iteration: u32,
        rng: &mut Pcg32,
    ) -> Stage {
        let source = pyramid.level(level.index);
        let iterations = em_iterations(level.index);
        let passes = nnf_passes(level.index);

        if iteration == 0 {
            debug!(
                "level {} ({}x{}): {} EM iterations of {} NNF passes",
                level.index,
                source.width(),
                source.height(),
                iterations,
                passes
            );
        }

        level.constrain();

        level.source_to_target.minimize(
            Mapping {
                input: source,
                output: &level.target,
                radius: self.radius,
            },
            passes,
            rng,
        );
        level.target_to_source.minimize(
            Mapping {
                input: &level.target,
                output: source,
                radius: self.radius,
            },
            passes,
            rng,
        );

        if iteration + 1 < iterations {
            level.target = self.resolve(&level, source, source, 1);
            Stage::Refine(level, iteration + 1)
        } else if level.index > 0 {
            Stage::Upscale(level)
        } else {
            Stage::Done(self.resolve(&level, source, source, 1))
        }
    }

    /// Votes the next level's target straight from the finer source, then
    /// seeds that level's fields from this one's
    fn upscale(&self, pyramid: &ImagePyramid, level: Level, rng: &mut Pcg32) -> Level {
        let index = level.index - 1;
        let finer = pyramid.level(index);

        debug!(
            "upscaling level {} to {}x{}",
            level.index,
            finer.width(),
            finer.height()
        );

        let target = self.resolve(&level, pyramid.level(level.index), finer, 2);

        let mut source_to_target = NearestNeighborField::new(finer.dimensions());
        source_to_target.seed_from(
            &level.source_to_target,
            self.mapping(finer, &target),
            rng,
            self.max_threads,
        );

        let mut target_to_source = NearestNeighborField::new(target.dimensions());
        target_to_source.seed_from(
            &level.target_to_source,
            self.mapping(&target, finer),
            rng,
            self.max_threads,
        );

        Level::new(
            index,
            finer,
            target,
            source_to_target,
            target_to_source,
            self.radius,
        )
    }

    #[inline]
    fn mapping<'a>(&self, input: &'a MaskedImage, output: &'a MaskedImage) -> Mapping<'a> {
        Mapping {
            input,
            output,
            radius: self.radius,
        }
    }

    /// One Expectation + Maximization step. With a `scale` of 2 the new target
    /// is the current one upsampled to `vote_source`'s size, and every vote
    /// lands on a 2x2 block.
    fn resolve(
        &self,
        level: &Level,
        source: &MaskedImage,
        vote_source: &MaskedImage,
        scale: u32,
    ) -> MaskedImage {
        let mut target = if scale == 1 {
            level.target.clone()
        } else {
            level
                .target
                .upsample(vote_source.width(), vote_source.height())
        };

        let mut votes = VoteBuffer::new(target.dimensions());
        self.expectation(&mut votes, level, source.dimensions(), vote_source, scale);
        let unresolved = maximization(&mut target, &votes);

        trace!(
            "level {}: {} of {} pixels received no votes",
            level.index,
            unresolved,
            votes.cells.len()
        );

        target
    }

    /// Accumulates the votes of both fields. Bands of vote rows are filled in
    /// parallel, each band by exactly one worker, and every cell sees its votes
    /// in the same order regardless of how the rows were split.
    fn expectation(
        &self,
        votes: &mut VoteBuffer,
        level: &Level,
        level_dims: Dims,
        vote_source: &MaskedImage,
        scale: u32,
    ) {
        let fields = [
            (&level.source_to_target, Direction::SourceToTarget),
            (&level.target_to_source, Direction::TargetToSource),
        ];
        let similarity = &self.similarity;
        let r = i64::from(self.radius);
        let s = i64::from(scale);
        let (lw, lh) = (i64::from(level_dims.width), i64::from(level_dims.height));
        let (vsw, vsh) = (
            i64::from(vote_source.width()),
            i64::from(vote_source.height()),
        );
        let vote_width = votes.dims.width as usize;
        let vw = i64::from(votes.dims.width);

        par::for_each_band(
            &mut votes.cells,
            vote_width,
            self.max_threads,
            |first_row, band| {
                let rows = first_row as i64..(first_row + band.len() / vote_width) as i64;

                for (field, direction) in fields.iter() {
                    let field_width = field.dimensions().width as usize;

                    for (i, link) in field.links().iter().enumerate() {
                        let weight = similarity.get(link.distance);
                        if weight <= 0.0 {
                            continue;
                        }

                        let here = ((i % field_width) as i64, (i / field_width) as i64);
                        let there = (i64::from(link.x), i64::from(link.y));

                        // the patch copied from, and the patch voted on
                        let ((sx, sy), (tx, ty)) = match direction {
                            Direction::SourceToTarget => (here, there),
                            Direction::TargetToSource => (there, here),
                        };

                        if (ty + r + 1) * s <= rows.start || (ty - r) * s >= rows.end {
                            continue;
                        }

                        for dy in -r..=r {
                            let (ys, yt) = (sy + dy, ty + dy);
                            if ys < 0 || ys >= lh || yt < 0 || yt >= lh {
                                continue;
                            }

                            for dx in -r..=r {
                                let (xs, xt) = (sx + dx, tx + dx);
                                if xs < 0 || xs >= lw || xt < 0 || xt >= lw {
                                    continue;
                                }

                                for uy in 0..s {
                                    let (fys, fyt) = (ys * s + uy, yt * s + uy);
                                    if fys >= vsh || !rows.contains(&fyt) {
                                        continue;
                                    }

                                    for ux in 0..s {
                                        let (fxs, fxt) = (xs * s + ux, xt * s + ux);
                                        if fxs >= vsw || fxt >= vw {
                                            continue;
                                        }

                                        let (fxs, fys) = (fxs as u32, fys as u32);
                                        if vote_source.is_masked(fxs, fys) {
                                            continue;
                                        }

                                        let px = vote_source.pixel(fxs, fys);
                                        let cell = &mut band[(fyt - rows.start) as usize
                                            * vote_width
                                            + fxt as usize];
                                        for c in 0..CHANNELS {
                                            cell.color[c] += weight * f64::from(px[c]);
                                        }
                                        cell.weight += weight;
                                    }
                                }
                            }
                        }
                    }
                }
            },
        );
    }
}

/// Resolves every voted pixel to its weighted mean color, returning how many
/// pixels received no votes and were left untouched
fn maximization(target: &mut MaskedImage, votes: &VoteBuffer) -> usize {
    let width = votes.dims.width as usize;
    let mut unresolved = 0;

    for (i, vote) in votes.cells.iter().enumerate() {
        if vote.weight <= 0.0 {
            unresolved += 1;
            continue;
        }

        let (x, y) = ((i % width) as u32, (i / width) as u32);
        let mut px = [0u8; 3];
        for (c, value) in px.iter_mut().enumerate() {
            *value = (vote.color[c] / vote.weight).round().max(0.0).min(255.0) as u8;
        }

        target.set_pixel(x, y, px);
        target.set_mask(x, y, false);
    }

    unresolved
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
    fn similarity_curve_shape() {
        let table = SimilarityTable::new();

        assert!((table.get(0) - 1.0).abs() < f64::EPSILON);
        for d in 1..=DSCALE {
            assert!(table.get(d) <= table.get(d - 1));
        }
        assert!(table.get(DSCALE / 20) > 0.0);
        assert!(table.get(DSCALE / 10 + 1) <= 0.0);
        assert!(table.get(DSCALE) <= 0.0);
    }

    #[test]
    fn schedule() {
        assert_eq!(em_iterations(0), 1);
        assert_eq!(em_iterations(3), 7);
        assert_eq!(nnf_passes(0), 1);
        assert_eq!(nnf_passes(4), 5);
        assert_eq!(nnf_passes(12), MAX_NNF_PASSES);
    }

    #[test]
    fn empty_mask_is_a_no_op() {
        let input = noise(37, 29);
        let output = Inpainter::new(2, 5, 2).inpaint(&input);
        assert_eq!(output.pixels(), input.pixels());
        assert_eq!(output.masked_count(), 0);
    }

    #[test]
    fn holes_are_fully_resolved() {
        let mut input = noise(40, 36);
        for y in 10..22 {
            for x in 15..30 {
                input.set_pixel(x, y, [255, 0, 255]);
                input.set_mask(x, y, true);
            }
        }

        let output = Inpainter::new(2, 1, 1).inpaint(&input);
        assert_eq!(output.dimensions(), input.dimensions());
        assert_eq!(output.masked_count(), 0);
    }

    #[test]
    fn single_level_pyramid() {
        let mut input = noise(5, 5);
        input.set_mask(2, 2, true);

        let output = Inpainter::new(5, 0, 1).inpaint(&input);
        assert_eq!(output.dimensions(), Dims::new(5, 5));
        assert_eq!(output.masked_count(), 0);
    }

    #[test]
    fn upscaled_votes_cover_2x2_blocks() {
        let coarse = noise(5, 4);
        let finer = noise(11, 9);

        let mut source_to_target = NearestNeighborField::new(coarse.dimensions());
        let mut target_to_source = NearestNeighborField::new(coarse.dimensions());
        for y in 0..4 {
            for x in 0..5 {
                source_to_target.pin_identity(x, y);
                target_to_source.pin_identity(x, y);
            }
        }

        let level = Level::new(
            1,
            &coarse,
            coarse.clone(),
            source_to_target,
            target_to_source,
            1,
        );
        let upsampled = coarse.upsample(11, 9);

        let resolved = Inpainter::new(1, 0, 2).resolve(&level, &coarse, &finer, 2);
        assert_eq!(resolved.dimensions(), finer.dimensions());

        for y in 0..9 {
            for x in 0..11 {
                if x < 10 && y < 8 {
                    assert_eq!(resolved.pixel(x, y), finer.pixel(x, y), "({}, {})", x, y);
                } else {
                    assert_eq!(resolved.pixel(x, y), upsampled.pixel(x, y), "({}, {})", x, y);
                }
            }
        }
    }

    #[test]
    fn maximization_keeps_unvoted_pixels() {
        let mut target = noise(4, 4);
        let before = target.clone();
        let mut votes = VoteBuffer::new(target.dimensions());
        votes.cells[5] = Vote {
            color: [20.0, 40.0, 61.0],
            weight: 2.0,
        };

        assert_eq!(maximization(&mut target, &votes), 15);
        assert_eq!(target.pixel(1, 1), [10, 20, 31]);
        assert_eq!(target.pixel(0, 0), before.pixel(0, 0));
    }
}
