// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `patch-inpaint` removes unwanted regions of a photo (scratches, objects,
//! blemishes) by synthesizing replacement content from the rest of the image.
//!
//! A mask marks the hole. The hole is filled coarse to fine over an image
//! pyramid: at each level two approximate nearest-neighbor fields, one from
//! the image's patches to the synthesized result's and one back, are refined
//! with PatchMatch, and every pixel is then resolved from the weighted votes
//! of all the patches overlapping it.
//!
//! All the interactions happen through a `Session`, built via a
//! `SessionBuilder` which follows the builder pattern. Calling `build` loads
//! the inputs and checks for various errors, and `run()` returns an
//! `InpaintedImage` that you can save, stream, or inspect.
//!
//! ## Usage
//!
//! ```no_run
//! let session = patch_inpaint::Session::builder()
//!     // Set some parameters
//!     .seed(10)
//!     .patch_radius(3)
//!     // Specify the photo and the region to remove
//!     .image(&"imgs/photo.jpg")
//!     .mask(&"imgs/photo_mask.png")
//!     // Build the session
//!     .build().expect("failed to build session");
//!
//! // Heal the image
//! let inpainted = session.run();
//!
//! // Save the result to disk
//! inpainted.save("healed.png").expect("failed to save inpainted image");
//! ```
mod errors;
mod img_pyramid;
mod inpaint;
mod masked_image;
mod nnf;
mod par;
mod patch_distance;
pub mod session;
mod utils;

use inpaint::Inpainter;
use utils::*;

pub use image;
use std::path::Path;

pub use errors::Error;
pub use masked_image::MaskedImage;
pub use patch_distance::{patch_distance, DSCALE};
pub use session::{Session, SessionBuilder};
pub use utils::{load_dynamic_image, ImageSource};

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

struct Parameters {
    patch_radius: u32,
    seed: u64,
    max_thread_count: Option<usize>,
    crop_padding: Option<u32>,
    keep_known_pixels: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            patch_radius: 2,
            seed: 0,
            max_thread_count: None,
            crop_padding: None,
            keep_known_pixels: true,
        }
    }
}

impl Parameters {
    fn thread_count(&self) -> usize {
        self.max_thread_count.unwrap_or_else(num_cpus::get)
    }
}

/// An image produced by `Session::run()`
pub struct InpaintedImage {
    image: image::RgbImage,
}

impl InpaintedImage {
    /// Saves the inpainted image to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent_path) = path.parent() {
            std::fs::create_dir_all(&parent_path)?;
        }

        self.image.save(&path)?;
        Ok(())
    }

    /// Writes the inpainted image to the specified stream
    pub fn write<W: std::io::Write>(
        self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = self.into_image();
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// Returns the inpainted output image
    pub fn into_image(self) -> image::DynamicImage {
        image::DynamicImage::ImageRgb8(self.image)
    }
}

impl AsRef<image::RgbImage> for InpaintedImage {
    fn as_ref(&self) -> &image::RgbImage {
        &self.image
    }
}
