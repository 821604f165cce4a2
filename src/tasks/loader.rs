use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fast_image_resize as fir;
use image::RgbaImage;
use tracing::debug;

use crate::error::ImageLoadError;
use crate::events::{PreparedImageCpu, WindowBounds};

// Decodes an image to RGBA8 and applies EXIF orientation if available.
// If metadata is missing, the original orientation is preserved.
pub fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage, ImageLoadError> {
    let img = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|source| ImageLoadError::Open {
            path: path.to_path_buf(),
            source,
        })?
        .decode()
        .map_err(|source| ImageLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let orientation = read_orientation(path).unwrap_or(1);
    Ok(apply_orientation(img.to_rgba8(), orientation))
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    use image::imageops::{flip_horizontal, flip_vertical, rotate90, rotate180, rotate270};

    match orientation {
        2 => flip_horizontal(&img),
        3 => rotate180(&img),
        4 => flip_vertical(&img),
        // transpose
        5 => flip_horizontal(&rotate90(&img)),
        6 => rotate90(&img),
        // transverse
        7 => flip_horizontal(&rotate270(&img)),
        8 => rotate270(&img),
        _ => img,
    }
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!("exif orientation {} for {}", o, path.display());
    Some(o)
}

/// Largest size with the image's aspect ratio that fits the window.
///
/// Fits to height when the window is proportionally wider than the image and
/// to width otherwise; portrait and landscape sources are treated alike.
/// Upscales small images. Integer math keeps exact ratios exact.
pub fn compute_scaled_size(img_w: u32, img_h: u32, win_w: u32, win_h: u32) -> (u32, u32) {
    let (img_w, img_h) = (u64::from(img_w.max(1)), u64::from(img_h.max(1)));
    let (win_w, win_h) = (u64::from(win_w.max(1)), u64::from(win_h.max(1)));

    let (w, h) = if win_w * img_h > img_w * win_h {
        (win_h * img_w / img_h, win_h)
    } else {
        (win_w, win_w * img_h / img_w)
    };
    (w.max(1) as u32, h.max(1) as u32)
}

/// Scale a decoded image to fit `bounds` and package it for the viewer.
pub fn scale_to_fit(
    path: &Path,
    image: RgbaImage,
    bounds: WindowBounds,
) -> Result<PreparedImageCpu, ImageLoadError> {
    let (src_w, src_h) = image.dimensions();
    let (dst_w, dst_h) = compute_scaled_size(src_w, src_h, bounds.width, bounds.height);
    let resize_err = |reason: String| ImageLoadError::Resize {
        path: path.to_path_buf(),
        reason,
    };

    let pixels = if (dst_w, dst_h) == (src_w, src_h) {
        image.into_raw()
    } else {
        let src_view =
            fir::images::ImageRef::new(src_w, src_h, image.as_raw(), fir::PixelType::U8x4)
                .map_err(|err| resize_err(err.to_string()))?;
        let mut dst_image = fir::images::Image::new(dst_w, dst_h, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
        let mut resizer = fir::Resizer::new();
        resizer
            .resize(&src_view, &mut dst_image, Some(&options))
            .map_err(|err| resize_err(err.to_string()))?;
        dst_image.into_vec()
    };

    debug!(
        path = %path.display(),
        from = ?(src_w, src_h),
        to = ?(dst_w, dst_h),
        "scaled image to window"
    );
    Ok(PreparedImageCpu {
        path: path.to_path_buf(),
        width: dst_w,
        height: dst_h,
        pixels,
    })
}
