use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::region::StrategyKind;

/// Rows and columns of the card layout in the source photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of cards the grid expects.
    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }
}

impl Default for GridShape {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

/// Tunables of the card boundary detector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Odd Gaussian kernel size applied before edge detection.
    pub blur_kernel_size: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub epsilon_fraction: f64,
    /// Minimum contour area as a fraction of the source image area.
    pub min_area_fraction: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            canny_low: 50.0,
            canny_high: 200.0,
            epsilon_fraction: 0.02,
            min_area_fraction: 0.02,
        }
    }
}

/// Tunables of the Hough circle strategy. Fractions are relative to the card height.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    pub median_kernel_size: u32,
    pub min_radius_fraction: f64,
    pub max_radius_fraction: f64,
    /// Minimum distance between two detected centers.
    pub min_center_distance_fraction: f64,
    /// Upper Canny threshold for the accumulator edges; the lower one is half of it.
    pub canny_high: f32,
    /// Votes pooled over the 5x5 cells around a center that it needs to be considered.
    pub vote_threshold: u32,
    /// Fraction of the circumference that must be backed by edge pixels.
    pub min_support: f64,
    /// Radius bonus in the `distance - bonus * radius` score.
    pub size_bonus: f64,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            median_kernel_size: 5,
            min_radius_fraction: 0.25,
            max_radius_fraction: 0.45,
            min_center_distance_fraction: 0.125,
            canny_high: 100.0,
            vote_threshold: 30,
            min_support: 0.3,
            size_bonus: 0.1,
        }
    }
}

/// Tunables of the Otsu contour strategy. Areas are fractions of the card area.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    pub blur_kernel_size: u32,
    /// Treat pixels darker than the Otsu level as foreground.
    pub invert: bool,
    pub min_area_fraction: f64,
    /// Area that earns one pixel of score bonus, as a fraction of the card area.
    pub score_area_fraction: f64,
    /// A fitted radius above this fraction of the card width is implausible.
    pub oversize_width_fraction: f64,
    /// Radius used instead of an implausible one, as a fraction of the card height.
    pub clamp_height_fraction: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            invert: false,
            min_area_fraction: 0.005,
            score_area_fraction: 0.005,
            oversize_width_fraction: 0.45,
            clamp_height_fraction: 0.4,
        }
    }
}

/// Everything the pipeline needs besides the image itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: GridShape,
    /// One label per grid cell in row-major order. Empty means `slot0..slotN`.
    pub labels: Vec<String>,
    /// Either one strategy per grid cell or a single strategy for all of them.
    pub strategies: Vec<StrategyKind>,
    pub detection: DetectionConfig,
    pub circle: CircleConfig,
    pub contour: ContourConfig,
    /// Side of the fallback square as a fraction of the card height.
    pub fallback_side_fraction: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridShape::default(),
            labels: Vec::new(),
            strategies: vec![StrategyKind::Circle],
            detection: DetectionConfig::default(),
            circle: CircleConfig::default(),
            contour: ContourConfig::default(),
            fallback_side_fraction: 0.75,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Labels for every slot, generated when none were configured.
    pub fn slot_labels(&self) -> Vec<String> {
        if self.labels.is_empty() {
            (0..self.grid.cells()).map(|i| format!("slot{}", i)).collect()
        } else {
            self.labels.clone()
        }
    }

    pub fn strategy_for(&self, slot: usize) -> StrategyKind {
        match self.strategies.as_slice() {
            [] => StrategyKind::Circle,
            [only] => *only,
            many => many.get(slot).copied().unwrap_or(StrategyKind::Circle),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        let cells = self.grid.cells();

        if cells == 0 {
            return invalid(format!(
                "grid {}x{} has no cells",
                self.grid.rows, self.grid.cols
            ));
        }
        if !self.labels.is_empty() && self.labels.len() != cells {
            return invalid(format!(
                "{} labels given for {} grid cells",
                self.labels.len(),
                cells
            ));
        }
        if self.strategies.len() > 1 && self.strategies.len() != cells {
            return invalid(format!(
                "{} strategies given for {} grid cells",
                self.strategies.len(),
                cells
            ));
        }
        for (name, k) in [
            ("detection.blur_kernel_size", self.detection.blur_kernel_size),
            ("circle.median_kernel_size", self.circle.median_kernel_size),
            ("contour.blur_kernel_size", self.contour.blur_kernel_size),
        ] {
            if k < 3 || k % 2 == 0 {
                return invalid(format!("{} must be odd and at least 3, got {}", name, k));
            }
        }
        if self.detection.canny_low <= 0.0 || self.detection.canny_low >= self.detection.canny_high
        {
            return invalid(format!(
                "canny thresholds must satisfy 0 < low < high, got {} and {}",
                self.detection.canny_low, self.detection.canny_high
            ));
        }
        if self.detection.epsilon_fraction <= 0.0 {
            return invalid("detection.epsilon_fraction must be positive".to_string());
        }
        if !(0.0 < self.circle.min_radius_fraction
            && self.circle.min_radius_fraction < self.circle.max_radius_fraction)
        {
            return invalid(format!(
                "circle radius fractions must satisfy 0 < min < max, got {} and {}",
                self.circle.min_radius_fraction, self.circle.max_radius_fraction
            ));
        }
        if self.contour.score_area_fraction <= 0.0 {
            return invalid("contour.score_area_fraction must be positive".to_string());
        }
        if self.fallback_side_fraction <= 0.0 {
            return invalid("fallback_side_fraction must be positive".to_string());
        }
        Ok(())
    }
}

/// Sigma of the Gaussian that an odd `kernel_size` box stands for.
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid.cells(), 4);
        assert_eq!(config.slot_labels(), vec!["slot0", "slot1", "slot2", "slot3"]);
    }

    #[test]
    fn test_single_strategy_applies_to_all_slots() {
        let config = PipelineConfig {
            strategies: vec![StrategyKind::Contour],
            ..Default::default()
        };
        assert_eq!(config.strategy_for(0), StrategyKind::Contour);
        assert_eq!(config.strategy_for(3), StrategyKind::Contour);
    }

    #[test]
    fn test_rejects_label_count_mismatch() {
        let config = PipelineConfig {
            labels: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_even_kernel() {
        let mut config = PipelineConfig::default();
        config.detection.blur_kernel_size = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "grid": { "rows": 1, "cols": 3 }, "strategies": ["circle", "contour", "circle"] }"#,
        )
        .unwrap();
        assert_eq!(config.grid, GridShape::new(1, 3));
        assert_eq!(config.strategy_for(1), StrategyKind::Contour);
        assert_eq!(config.detection, DetectionConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sigma_for_kernel() {
        assert!((sigma_for_kernel(5) - 1.1).abs() < 1e-6);
        assert!((sigma_for_kernel(3) - 0.8).abs() < 1e-6);
    }
}
