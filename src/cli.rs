use clap::Parser;
use std::path::PathBuf;

use crate::config::{GridShape, PipelineConfig};
use crate::error::PipelineError;
use crate::region::StrategyKind;

#[derive(Parser, Debug)]
#[command(name = "card-rectify")]
#[command(version, about = "Rectify a grid of photographed cards and crop the emblem of each")]
pub struct Cli {
    /// Photo containing the card grid
    #[arg(required = true)]
    pub input: PathBuf,

    /// Directory for the card and logo images
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// JSON file with pipeline settings; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Grid layout as ROWSxCOLS (e.g., "2x2")
    #[arg(short, long, value_parser = parse_grid)]
    pub grid: Option<GridShape>,

    /// Slot labels in row-major order, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Region strategy per slot, or a single one for all slots
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub strategies: Vec<StrategyKind>,

    /// Output image extension, which also selects the encoder
    #[arg(short, long, default_value = "png")]
    pub extension: String,

    /// Show detection details
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Config file (or defaults) with the command line applied on top.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(grid) = self.grid {
            config.grid = grid;
        }
        if !self.labels.is_empty() {
            config.labels = self.labels.clone();
        }
        if !self.strategies.is_empty() {
            config.strategies = self.strategies.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn card_path(&self, label: &str) -> PathBuf {
        self.output_dir
            .join(format!("card_{}.{}", label, self.extension))
    }

    pub fn logo_path(&self, label: &str) -> PathBuf {
        self.output_dir
            .join(format!("logo_{}.{}", label, self.extension))
    }
}

fn parse_grid(s: &str) -> Result<GridShape, String> {
    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    if parts.len() != 2 {
        return Err(format!("Invalid grid format '{}', expected ROWSxCOLS", s));
    }

    let rows: usize = parts[0]
        .trim()
        .parse()
        .map_err(|_| format!("Invalid row count: {}", parts[0]))?;
    let cols: usize = parts[1]
        .trim()
        .parse()
        .map_err(|_| format!("Invalid column count: {}", parts[1]))?;

    if rows == 0 || cols == 0 {
        return Err("Grid dimensions must be positive".to_string());
    }

    Ok(GridShape::new(rows, cols))
}
