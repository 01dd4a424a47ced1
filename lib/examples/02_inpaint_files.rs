//! Usage: `cargo run --example 02_inpaint_files -- <image> <mask> <out>`

fn main() -> Result<(), patch_inpaint::Error> {
    let mut args = std::env::args().skip(1);
    let (image, mask, out) = match (args.next(), args.next(), args.next()) {
        (Some(image), Some(mask), Some(out)) => (image, mask, out),
        _ => {
            eprintln!("usage: 02_inpaint_files <image> <mask> <out>");
            std::process::exit(2);
        }
    };

    let session = patch_inpaint::Session::builder()
        .image(&image)
        .mask(&mask)
        // heal only a neighborhood of the holes, which is much faster on large photos
        .crop_padding(64)
        .seed(42)
        .build()?;

    session.run().save(out)
}
