use structopt::StructOpt;

use flexi_logger::{Logger, LoggerHandle};
use log::info;
use patch_inpaint::{image::ImageOutputFormat as ImgFmt, Error, Session};
use std::path::PathBuf;

fn parse_img_fmt(input: &str) -> Result<ImgFmt, String> {
    let fmt = match input {
        "png" => ImgFmt::Png,
        "jpg" => ImgFmt::Jpeg(75),
        "bmp" => ImgFmt::Bmp,
        other => {
            return Err(format!(
                "image format `{}` not one of: 'png', 'jpg', 'bmp'",
                other
            ))
        }
    };

    Ok(fmt)
}

#[derive(StructOpt)]
#[structopt(
    name = "patch-inpaint",
    about = "Fills the holes of an image with patches taken from the rest of it",
    rename_all = "kebab-case"
)]
struct Opt {
    /// The image to heal
    #[structopt(parse(from_os_str))]
    image: PathBuf,
    /// Path to the hole mask, where every non-black pixel is synthesized and
    /// black pixels are kept. Must be the same size as the image.
    #[structopt(long, parse(from_os_str))]
    mask: PathBuf,
    /// The path to save the healed image to, the file extensions of the path determines
    /// the image format used. You may use `-` for stdout.
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
    /// The format to save the healed image as.
    ///
    /// NOTE: this will only apply when stdout is specified via `-o -`, otherwise the image
    /// format is determined by the file extension of the path provided to `-o`
    #[structopt(
        long,
        default_value = "png",
        parse(try_from_str = parse_img_fmt)
    )]
    out_fmt: ImgFmt,
    /// Half the side of the square patches that are compared and copied. Larger
    /// values capture larger structures.
    #[structopt(long, default_value = "2")]
    radius: u32,
    /// A seed value for the random search, the same image, mask and seed always
    /// give the same result
    #[structopt(long, default_value = "0")]
    seed: u64,
    /// The maximum number of worker threads that can be active at any one time
    /// while inpainting. Defaults to the logical core count.
    #[structopt(short = "t", long = "threads")]
    max_threads: Option<usize>,
    /// Only inpaint the bounding box of the mask grown by this many pixels,
    /// instead of the whole image
    #[structopt(long)]
    crop_padding: Option<u32>,
    /// Also write the synthesized values of known pixels near the hole, instead
    /// of only replacing the masked pixels
    #[structopt(long)]
    overwrite_known: bool,
    /// Logs progress to stderr, repeat for more detail. Overrides `RUST_LOG`.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn main() {
    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn setup_logging(verbose: u8) -> Option<LoggerHandle> {
    let logger = match verbose {
        0 => Logger::try_with_env_or_str("warn"),
        1 => Logger::try_with_str("info"),
        2 => Logger::try_with_str("debug"),
        _ => Logger::try_with_str("trace"),
    };

    // The image itself may be going to stdout, so logs never do
    match logger.and_then(|logger| logger.log_to_stderr().start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("warning: logging is disabled: {}", e);
            None
        }
    }
}

fn real_main() -> Result<(), Error> {
    let args = Opt::from_args();
    let _logger = setup_logging(args.verbose);

    // Check that the extension for the path supplied by the user is one of the ones we support
    {
        match args.output_path.extension().and_then(|ext| ext.to_str()) {
            Some("png") | Some("jpg") | Some("bmp") => {}
            None => {}
            Some(other) => return Err(Error::UnsupportedOutputFormat(other.to_owned())),
        }
    }

    let mut sb = Session::builder()
        .image(&args.image)
        .mask(&args.mask)
        .patch_radius(args.radius)
        .seed(args.seed)
        .keep_known_pixels(!args.overwrite_known);

    if let Some(mt) = args.max_threads {
        sb = sb.max_thread_count(mt);
    }

    if let Some(padding) = args.crop_padding {
        sb = sb.crop_padding(padding);
    }

    let session = sb.build()?;
    let healed = session.run();

    if args.output_path.to_str() == Some("-") {
        let out = std::io::stdout();
        let mut out = out.lock();
        healed.write(&mut out, args.out_fmt)?;
    } else {
        // As with stdout, the extension wins over `--out-fmt`
        healed.save(&args.output_path)?;
        info!("saved {}", args.output_path.display());
    }

    Ok(())
}
