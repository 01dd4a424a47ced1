use patch_inpaint::image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

fn main() -> Result<(), patch_inpaint::Error> {
    // a checkerboard with a smudge painted over one of its tiles
    let mut img = RgbImage::from_fn(128, 128, |x, y| {
        if (x / 16 + y / 16) % 2 == 0 {
            Rgb([30, 60, 90])
        } else {
            Rgb([230, 220, 200])
        }
    });
    let mask = GrayImage::from_fn(128, 128, |x, y| {
        let hole = (44..70).contains(&x) && (50..76).contains(&y);
        if hole {
            img.put_pixel(x, y, Rgb([255, 0, 0]));
            Luma([255])
        } else {
            Luma([0])
        }
    });

    std::fs::create_dir_all("out")?;
    img.save("out/01_defaced.png")?;

    let session = patch_inpaint::Session::builder()
        .image(DynamicImage::ImageRgb8(img))
        .mask(DynamicImage::ImageLuma8(mask))
        .patch_radius(3)
        .build()?;

    //heal the image and save it to the disk
    session.run().save("out/01_healed.png")
}
