use clap::ValueEnum;
use image::{GrayImage, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use nalgebra::Point2;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{sigma_for_kernel, CircleConfig, ContourConfig, PipelineConfig};
use crate::detection::external_contours;
use crate::geometry::{contour_area, contour_centroid, min_enclosing_circle, to_point2, Circle};
use crate::hough::{detect_circles, CircleSearch};

/// Which detector looks for the emblem of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Hough circles; suits emblems with a crisp round outline.
    Circle,
    /// Otsu blobs; suits low-contrast or dark cards.
    Contour,
}

/// Where a located region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    Circle,
    Contour,
    /// Nothing was found; a centered fixed-fraction square stands in.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedRegion {
    pub circle: Circle,
    pub source: RegionSource,
}

/// Finds the dominant round region of a rectified card.
pub trait RegionLocator {
    fn name(&self) -> &'static str;

    fn locate(&self, card: &RgbImage) -> Option<Circle>;
}

fn card_center(card: &RgbImage) -> Point2<f64> {
    Point2::new(card.width() as f64 / 2.0, card.height() as f64 / 2.0)
}

pub struct CircleStrategy {
    config: CircleConfig,
}

impl CircleStrategy {
    pub fn new(config: CircleConfig) -> Self {
        Self { config }
    }

    fn search(&self, card_height: u32) -> CircleSearch {
        let h = card_height as f64;
        CircleSearch {
            min_radius: (self.config.min_radius_fraction * h).round() as u32,
            max_radius: (self.config.max_radius_fraction * h).round() as u32,
            min_center_distance: self.config.min_center_distance_fraction * h,
            canny_high: self.config.canny_high,
            vote_threshold: self.config.vote_threshold,
            min_support: self.config.min_support,
        }
    }
}

impl RegionLocator for CircleStrategy {
    fn name(&self) -> &'static str {
        "circle"
    }

    /// Prefer central circles, with a mild bonus for larger ones.
    fn locate(&self, card: &RgbImage) -> Option<Circle> {
        let gray = image::imageops::grayscale(card);
        let radius = self.config.median_kernel_size / 2;
        let denoised = median_filter(&gray, radius, radius);

        let circles = detect_circles(&denoised, &self.search(card.height()));
        debug!(circles = circles.len(), "hough circles on card");

        let center = card_center(card);
        let score = |c: &Circle| {
            nalgebra::distance(&c.center, &center) - self.config.size_bonus * c.radius
        };
        circles
            .into_iter()
            .map(|hc| hc.circle)
            .min_by(|a, b| score(a).total_cmp(&score(b)))
    }
}

pub struct ContourStrategy {
    config: ContourConfig,
}

impl ContourStrategy {
    pub fn new(config: ContourConfig) -> Self {
        Self { config }
    }

    /// Otsu foreground mask, or `None` when every pixel lands on the same side.
    fn binarize(&self, card: &RgbImage) -> Option<GrayImage> {
        let gray = image::imageops::grayscale(card);
        let blurred = gaussian_blur_f32(&gray, sigma_for_kernel(self.config.blur_kernel_size));
        let level = otsu_level(&blurred);
        let invert = self.config.invert;
        let binary = GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
            let bright = blurred.get_pixel(x, y)[0] > level;
            image::Luma([if bright != invert { 255 } else { 0 }])
        });

        let foreground = binary.pixels().filter(|p| p[0] != 0).count();
        if foreground == 0 || foreground == (binary.width() * binary.height()) as usize {
            return None;
        }
        Some(binary)
    }
}

impl RegionLocator for ContourStrategy {
    fn name(&self) -> &'static str {
        "contour"
    }

    /// Pick the blob that is central and large, then fit its enclosing circle.
    fn locate(&self, card: &RgbImage) -> Option<Circle> {
        let (width, height) = card.dimensions();
        let card_area = width as f64 * height as f64;
        let min_area = self.config.min_area_fraction * card_area;
        let area_unit = self.config.score_area_fraction * card_area;
        let center = card_center(card);

        let binary = self.binarize(card)?;
        let best = external_contours(&binary)
            .into_iter()
            .filter_map(|contour| {
                let area = contour_area(&contour.points);
                if area < min_area {
                    return None;
                }
                let centroid = contour_centroid(&contour.points)?;
                let score = nalgebra::distance(&centroid, &center) - area / area_unit;
                Some((score, contour))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))?;

        let points: Vec<Point2<f64>> = best.1.points.iter().map(to_point2).collect();
        let mut circle = min_enclosing_circle(&points)?;
        if circle.radius > self.config.oversize_width_fraction * width as f64 {
            let clamped = self.config.clamp_height_fraction * height as f64;
            debug!(
                fitted = circle.radius,
                clamped, "enclosing circle larger than the card allows"
            );
            circle.radius = clamped;
        }
        Some(circle)
    }
}

impl StrategyKind {
    pub fn locator(&self, config: &PipelineConfig) -> Box<dyn RegionLocator> {
        match self {
            StrategyKind::Circle => Box::new(CircleStrategy::new(config.circle.clone())),
            StrategyKind::Contour => Box::new(ContourStrategy::new(config.contour.clone())),
        }
    }
}

/// Centered square of side `side_fraction * height`, expressed as its inscribed circle.
pub fn fallback_region(card: &RgbImage, side_fraction: f64) -> Circle {
    let side = side_fraction * card.height() as f64;
    Circle::new(card_center(card), side / 2.0)
}

/// Run the configured strategy, falling back to a fixed central square.
pub fn locate_region(
    card: &RgbImage,
    strategy: StrategyKind,
    config: &PipelineConfig,
) -> LocatedRegion {
    let locator = strategy.locator(config);
    match locator.locate(card) {
        Some(circle) if circle.radius > 0.0 => LocatedRegion {
            circle,
            source: match strategy {
                StrategyKind::Circle => RegionSource::Circle,
                StrategyKind::Contour => RegionSource::Contour,
            },
        },
        _ => {
            warn!(
                strategy = locator.name(),
                "no region found, using the central fallback square"
            );
            LocatedRegion {
                circle: fallback_region(card, config.fallback_side_fraction),
                source: RegionSource::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_circle_mut;

    use crate::crop::square_crop_rect;

    fn card_with_disc(
        width: u32,
        height: u32,
        background: u8,
        disc: u8,
        center: (i32, i32),
        radius: i32,
    ) -> RgbImage {
        let mut card = RgbImage::from_pixel(width, height, Rgb([background; 3]));
        draw_filled_circle_mut(&mut card, center, radius, Rgb([disc; 3]));
        card
    }

    #[test]
    fn test_circle_strategy_recovers_radius() {
        let card = card_with_disc(300, 200, 235, 25, (150, 100), 70);
        let circle = CircleStrategy::new(CircleConfig::default())
            .locate(&card)
            .unwrap();
        assert!((circle.radius - 70.0).abs() <= 3.5, "radius {}", circle.radius);
        assert!((circle.center.x - 150.0).abs() < 2.0);
        assert!((circle.center.y - 100.0).abs() < 2.0);
    }

    #[test]
    fn test_circle_strategy_recovers_crisp_discs_across_radii() {
        let cases = [
            (300, 200, (150, 100), 52),
            (300, 200, (150, 100), 64),
            (300, 200, (141, 96), 70),
            (300, 200, (150, 100), 76),
            (300, 200, (141, 96), 88),
            (600, 400, (300, 200), 112),
            (600, 400, (300, 200), 140),
            (600, 400, (300, 200), 168),
        ];
        let strategy = CircleStrategy::new(CircleConfig::default());
        for (width, height, center, radius) in cases {
            let card = card_with_disc(width, height, 235, 25, center, radius);
            let circle = strategy
                .locate(&card)
                .unwrap_or_else(|| panic!("no circle for radius {} on {}x{}", radius, width, height));
            let truth = radius as f64;
            assert!(
                (circle.radius - truth).abs() <= 0.05 * truth,
                "radius {:.2} vs {}",
                circle.radius,
                radius
            );
            assert!((circle.center.x - center.0 as f64).abs() < 2.0);
            assert!((circle.center.y - center.1 as f64).abs() < 2.0);
        }
    }

    #[test]
    fn test_circle_strategy_prefers_central_circle() {
        let mut card = card_with_disc(600, 200, 235, 25, (300, 100), 60);
        draw_filled_circle_mut(&mut card, (80, 100), 60, Rgb([25; 3]));
        let circle = CircleStrategy::new(CircleConfig::default())
            .locate(&card)
            .unwrap();
        assert!((circle.center.x - 300.0).abs() < 3.0);
    }

    #[test]
    fn test_contour_strategy_finds_bright_blob() {
        let card = card_with_disc(300, 200, 30, 220, (140, 105), 60);
        let circle = ContourStrategy::new(ContourConfig::default())
            .locate(&card)
            .unwrap();
        assert!((circle.radius - 60.0).abs() <= 3.0, "radius {}", circle.radius);
        assert!((circle.center.x - 140.0).abs() < 2.0);
        assert!((circle.center.y - 105.0).abs() < 2.0);
    }

    #[test]
    fn test_contour_strategy_inverted_finds_dark_blob() {
        let card = card_with_disc(300, 200, 220, 30, (150, 100), 55);
        let config = ContourConfig {
            invert: true,
            ..Default::default()
        };
        let circle = ContourStrategy::new(config).locate(&card).unwrap();
        assert!((circle.radius - 55.0).abs() <= 3.0, "radius {}", circle.radius);
    }

    #[test]
    fn test_contour_strategy_clamps_oversized_blob() {
        // Radius 95 exceeds 0.45 * 200 = 90.
        let card = card_with_disc(200, 200, 30, 220, (100, 100), 95);
        let circle = ContourStrategy::new(ContourConfig::default())
            .locate(&card)
            .unwrap();
        assert_eq!(circle.radius, 0.4 * 200.0);
    }

    #[test]
    fn test_blank_card_falls_back() {
        let card = RgbImage::from_pixel(320, 200, Rgb([128; 3]));
        let config = PipelineConfig::default();
        for strategy in [StrategyKind::Circle, StrategyKind::Contour] {
            let region = locate_region(&card, strategy, &config);
            assert_eq!(region.source, RegionSource::Fallback);
            assert_eq!(region.circle.center, Point2::new(160.0, 100.0));
            assert_eq!(region.circle.radius, 75.0);
        }
    }

    #[test]
    fn test_every_strategy_yields_a_square_inside_the_card() {
        let cards = [
            card_with_disc(300, 200, 235, 25, (150, 100), 70),
            card_with_disc(300, 200, 30, 220, (140, 105), 60),
            card_with_disc(200, 200, 30, 220, (100, 100), 95),
            card_with_disc(120, 200, 235, 25, (20, 30), 80),
            RgbImage::from_pixel(100, 300, Rgb([128; 3])),
        ];
        let config = PipelineConfig::default();
        for card in &cards {
            for strategy in [StrategyKind::Circle, StrategyKind::Contour] {
                let region = locate_region(card, strategy, &config);
                let rect = square_crop_rect(card.dimensions(), &region.circle).unwrap();
                assert!(rect.side > 0);
                assert!(rect.x + rect.side <= card.width());
                assert!(rect.y + rect.side <= card.height());
            }
        }
    }
}
