use std::path::Path;

use image::{ImageReader, RgbImage};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::crop::{crop_region, CropRect};
use crate::detection::{detect_candidates, select_quads, SelectionStatus};
use crate::error::{CardError, PipelineError};
use crate::geometry::order_corners;
use crate::grid::{sort_into_grid, GridSlot};
use crate::region::{locate_region, LocatedRegion, RegionSource, StrategyKind};
use crate::transform::rectify;

/// Card outlines found in the source image, already in grid order.
#[derive(Debug, Clone)]
pub struct DetectedCards {
    pub slots: Vec<GridSlot>,
    pub selection: SelectionStatus,
}

/// Everything produced for one successful slot.
#[derive(Debug, Clone)]
pub struct CardOutput {
    pub card: RgbImage,
    pub region: LocatedRegion,
    pub crop_rect: CropRect,
    pub crop: RgbImage,
}

impl CardOutput {
    /// Region diameter relative to the card height.
    pub fn diameter_ratio(&self) -> f64 {
        2.0 * self.region.circle.radius / self.card.height() as f64
    }

    pub fn is_degraded(&self) -> bool {
        self.region.source == RegionSource::Fallback
    }
}

#[derive(Debug, Clone)]
pub struct CardOutcome {
    pub row: usize,
    pub col: usize,
    pub label: String,
    pub strategy: StrategyKind,
    pub result: Result<CardOutput, CardError>,
}

/// Result of one run over a source image.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub selection: SelectionStatus,
    pub cards: Vec<CardOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&CardOutcome, &CardOutput)> {
        self.cards
            .iter()
            .filter_map(|c| c.result.as_ref().ok().map(|out| (c, out)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&CardOutcome, &CardError)> {
        self.cards
            .iter()
            .filter_map(|c| c.result.as_ref().err().map(|err| (c, err)))
    }
}

pub fn load_image(path: &Path) -> Result<RgbImage, PipelineError> {
    let load = |source| PipelineError::Load {
        path: path.to_path_buf(),
        source,
    };
    let img = ImageReader::open(path)
        .map_err(|e| load(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| load(image::ImageError::IoError(e)))?
        .decode()
        .map_err(load)?;
    Ok(img.to_rgb8())
}

/// Detect, select and grid-sort the card outlines.
pub fn detect_cards(
    image: &RgbImage,
    config: &PipelineConfig,
) -> Result<DetectedCards, PipelineError> {
    config.validate()?;

    let candidates = detect_candidates(image, &config.detection);
    let selection = select_quads(candidates, config.grid.cells())?;
    let slots = sort_into_grid(selection.quads, config.grid, &config.slot_labels())?;
    Ok(DetectedCards {
        slots,
        selection: selection.status,
    })
}

fn process_slot(
    image: &RgbImage,
    slot: &GridSlot,
    strategy: StrategyKind,
    config: &PipelineConfig,
) -> Result<CardOutput, CardError> {
    let quad = order_corners(&slot.quad.points)?;
    let rectified = rectify(image, &quad)?;
    let region = locate_region(&rectified.image, strategy, config);
    let (crop_rect, crop) = crop_region(&rectified.image, &region.circle)?;
    Ok(CardOutput {
        card: rectified.image,
        region,
        crop_rect,
        crop,
    })
}

/// Run every slot independently; a failing slot does not affect the others.
pub fn process_slots(
    image: &RgbImage,
    slots: &[GridSlot],
    config: &PipelineConfig,
) -> Vec<CardOutcome> {
    slots
        .par_iter()
        .enumerate()
        .map(|(index, slot)| {
            let strategy = config.strategy_for(index);
            let result = process_slot(image, slot, strategy, config);
            match &result {
                Ok(out) => info!(
                    label = %slot.label,
                    width = out.card.width(),
                    height = out.card.height(),
                    source = ?out.region.source,
                    radius = out.region.circle.radius,
                    "card processed"
                ),
                Err(err) => warn!(label = %slot.label, error = %err, "card failed"),
            }
            CardOutcome {
                row: slot.row,
                col: slot.col,
                label: slot.label.clone(),
                strategy,
                result,
            }
        })
        .collect()
}

/// Full pipeline over an already loaded image.
pub fn process_image(
    image: &RgbImage,
    config: &PipelineConfig,
) -> Result<BatchReport, PipelineError> {
    let detected = detect_cards(image, config)?;
    let cards = process_slots(image, &detected.slots, config);
    Ok(BatchReport {
        selection: detected.selection,
        cards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use nalgebra::Point2;

    use crate::geometry::Quadrilateral;

    fn slot(label: &str, points: [(f64, f64); 4]) -> GridSlot {
        GridSlot {
            row: 0,
            col: 0,
            label: label.to_string(),
            quad: Quadrilateral::from_points(points.map(|(x, y)| Point2::new(x, y))),
        }
    }

    #[test]
    fn test_missing_image_is_a_load_failure() {
        let result = load_image(Path::new("/nonexistent/cards.png"));
        assert!(matches!(result, Err(PipelineError::Load { .. })));
    }

    #[test]
    fn test_blank_image_has_insufficient_detections() {
        let image = RgbImage::new(200, 150);
        let result = process_image(&image, &PipelineConfig::default());
        assert!(matches!(
            result,
            Err(PipelineError::InsufficientDetections { found: 0, required: 4 })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_detection() {
        let image = RgbImage::new(200, 150);
        let config = PipelineConfig {
            labels: vec!["only".into()],
            ..Default::default()
        };
        assert!(matches!(
            process_image(&image, &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_degenerate_slot_does_not_affect_others() {
        let image = RgbImage::from_pixel(300, 200, Rgb([200, 200, 200]));
        let slots = vec![
            slot("good", [(10.0, 10.0), (130.0, 12.0), (128.0, 90.0), (12.0, 88.0)]),
            slot("flat", [(10.0, 100.0), (80.0, 100.0), (150.0, 100.0), (150.0, 180.0)]),
        ];
        let outcomes = process_slots(&image, &slots, &PipelineConfig::default());

        assert_eq!(outcomes.len(), 2);
        let good = outcomes[0].result.as_ref().unwrap();
        assert!(good.is_degraded());
        assert!(matches!(
            outcomes[1].result,
            Err(CardError::DegenerateQuad { .. })
        ));
    }
}
