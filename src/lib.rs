pub mod cli;
pub mod config;
pub mod crop;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod hough;
pub mod pipeline;
pub mod region;
pub mod transform;

pub use cli::Cli;
pub use config::{GridShape, PipelineConfig};
pub use crop::{crop_region, square_crop_rect, CropRect};
pub use detection::{detect_candidates, select_quads, Selection, SelectionStatus};
pub use error::{CardError, PipelineError};
pub use geometry::{order_corners, Circle, OrderedQuad, Quadrilateral};
pub use grid::{sort_into_grid, GridSlot};
pub use pipeline::{
    detect_cards, load_image, process_image, process_slots, BatchReport, CardOutcome, CardOutput,
};
pub use region::{
    locate_region, CircleStrategy, ContourStrategy, LocatedRegion, RegionLocator, RegionSource,
    StrategyKind,
};
pub use transform::{rectify, RectifiedCard};
