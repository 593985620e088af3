use image::{imageops, RgbImage};

use crate::error::CardError;
use crate::geometry::Circle;

/// Square crop window in card pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

/// The square circumscribing `circle`, clamped into a `width x height` card.
///
/// When clamping shortens one axis the other is cut to match, keeping the
/// clamped top-left corner.
pub fn square_crop_rect(
    (width, height): (u32, u32),
    circle: &Circle,
) -> Result<CropRect, CardError> {
    let x1 = (circle.center.x - circle.radius).round() as i64;
    let y1 = (circle.center.y - circle.radius).round() as i64;
    let x2 = (circle.center.x + circle.radius).round() as i64;
    let y2 = (circle.center.y + circle.radius).round() as i64;

    let cx1 = x1.clamp(0, width as i64);
    let cy1 = y1.clamp(0, height as i64);
    let cx2 = x2.clamp(0, width as i64);
    let cy2 = y2.clamp(0, height as i64);

    let side = (cx2 - cx1).min(cy2 - cy1);
    if side <= 0 {
        return Err(CardError::EmptyCrop {
            x: x1,
            y: y1,
            width,
            height,
        });
    }

    Ok(CropRect {
        x: cx1 as u32,
        y: cy1 as u32,
        side: side as u32,
    })
}

/// Cut the square around `circle` out of the card.
pub fn crop_region(card: &RgbImage, circle: &Circle) -> Result<(CropRect, RgbImage), CardError> {
    let rect = square_crop_rect(card.dimensions(), circle)?;
    let cropped = imageops::crop_imm(card, rect.x, rect.y, rect.side, rect.side).to_image();
    Ok((rect, cropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use nalgebra::Point2;

    #[test]
    fn test_centered_circle() {
        let circle = Circle::new(Point2::new(150.0, 100.0), 70.0);
        let rect = square_crop_rect((300, 200), &circle).unwrap();
        assert_eq!(rect, CropRect { x: 80, y: 30, side: 140 });
    }

    #[test]
    fn test_clamped_axis_shrinks_the_other() {
        // Reaches past the left edge by 20px.
        let circle = Circle::new(Point2::new(30.0, 100.0), 50.0);
        let rect = square_crop_rect((300, 200), &circle).unwrap();
        assert_eq!(rect, CropRect { x: 0, y: 50, side: 80 });
    }

    #[test]
    fn test_circle_larger_than_card() {
        let circle = Circle::new(Point2::new(50.0, 150.0), 112.5);
        let rect = square_crop_rect((100, 300), &circle).unwrap();
        assert_eq!(rect.side, 100);
        assert!(rect.y + rect.side <= 300);
    }

    #[test]
    fn test_circle_outside_card_is_empty() {
        let circle = Circle::new(Point2::new(-50.0, 40.0), 20.0);
        assert!(matches!(
            square_crop_rect((300, 200), &circle),
            Err(CardError::EmptyCrop { .. })
        ));
    }

    #[test]
    fn test_crop_region_copies_pixels() {
        let card = RgbImage::from_fn(60, 40, |x, y| Rgb([x as u8, y as u8, 0]));
        let circle = Circle::new(Point2::new(30.0, 20.0), 10.0);
        let (rect, cropped) = crop_region(&card, &circle).unwrap();
        assert_eq!(cropped.dimensions(), (rect.side, rect.side));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([20, 10, 0]));
    }
}
