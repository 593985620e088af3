use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Point2};
use tracing::debug;

use crate::error::CardError;
use crate::geometry::{has_collinear_corners, perspective_transform, transform_point, OrderedQuad};

/// A card warped to an axis-aligned rectangle.
#[derive(Debug, Clone)]
pub struct RectifiedCard {
    pub image: RgbImage,
    /// Forward map from source pixels to card pixels.
    pub transform: Matrix3<f64>,
}

/// Bilinear interpolation with edge clamping
fn bilinear_interpolate(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x_frac = x - x.floor();
    let y_frac = y - y.floor();

    let get_pixel = |px: i64, py: i64| -> Rgb<u8> {
        let px = px.clamp(0, width as i64 - 1) as u32;
        let py = py.clamp(0, height as i64 - 1) as u32;
        *img.get_pixel(px, py)
    };

    let p00 = get_pixel(x0, y0);
    let p10 = get_pixel(x0 + 1, y0);
    let p01 = get_pixel(x0, y0 + 1);
    let p11 = get_pixel(x0 + 1, y0 + 1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - x_frac) + p10[c] as f64 * x_frac;
        let bottom = p01[c] as f64 * (1.0 - x_frac) + p11[c] as f64 * x_frac;
        result[c] = (top * (1.0 - y_frac) + bottom * y_frac).round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// Warp the area inside `quad` to a straight W x H image.
///
/// W and H are the longer edges of each opposing pair. The corners map to
/// (0,0), (W-1,0), (W-1,H-1) and (0,H-1); every output pixel is sampled from
/// the source through the inverse transform.
pub fn rectify(img: &RgbImage, quad: &OrderedQuad) -> Result<RectifiedCard, CardError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(CardError::degenerate("source image is empty"));
    }
    let (width, height) = quad.rectified_size();
    if width == 0 || height == 0 {
        return Err(CardError::degenerate(format!(
            "rectified size is {}x{}",
            width, height
        )));
    }

    let src = quad.corners();
    if has_collinear_corners(&src) {
        return Err(CardError::degenerate("three corners are collinear"));
    }

    let (w, h) = ((width - 1) as f64, (height - 1) as f64);
    let dst = [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, h),
        Point2::new(0.0, h),
    ];

    let forward = perspective_transform(&src, &dst)
        .ok_or_else(|| CardError::degenerate("perspective transform is singular"))?;
    let inverse = forward
        .try_inverse()
        .ok_or_else(|| CardError::degenerate("perspective transform is not invertible"))?;

    let output = RgbImage::from_fn(width, height, |out_x, out_y| {
        let (src_x, src_y) = transform_point(&inverse, out_x as f64, out_y as f64);
        bilinear_interpolate(img, src_x, src_y)
    });

    debug!(width, height, "rectified card");
    Ok(RectifiedCard {
        image: output,
        transform: forward,
    })
}
