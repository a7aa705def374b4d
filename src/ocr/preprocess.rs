use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};

/// Converts an image to black and white around a fraction of max intensity.
///
/// Grayscale pixels strictly brighter than `level * 255` become white (255),
/// everything else black (0).
pub fn binarize(img: &RgbaImage, level: f32) -> GrayImage {
    let gray = imageops::grayscale(img);
    let cutoff = level * 255.0;
    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = if pixel[0] as f32 > cutoff { 255u8 } else { 0u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Resizes by `factor` with Lanczos filtering. Dimensions never drop below 1.
pub fn upscale(img: &RgbaImage, factor: f32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let new_w = ((w as f32 * factor) as u32).max(1);
    let new_h = ((h as f32 * factor) as u32).max(1);
    imageops::resize(img, new_w, new_h, FilterType::Lanczos3)
}

/// Crops a pixel rectangle, clamped to the image bounds.
pub fn crop_pixels(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let x0 = x.min(w);
    let y0 = y.min(h);
    let cw = width.min(w - x0);
    let ch = height.min(h - y0);
    imageops::crop_imm(img, x0, y0, cw, ch).to_image()
}
