use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use card_rectify::{load_image, process_image, Cli, SelectionStatus};

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli
        .pipeline_config()
        .context("Failed to build pipeline configuration")?;

    // Load input image
    let img = load_image(&cli.input)?;
    eprintln!(
        "Loaded image: {:?} ({}x{})",
        cli.input,
        img.width(),
        img.height()
    );

    let report = process_image(&img, &config).context("Card detection failed")?;

    if let SelectionStatus::BestEffort { candidates } = report.selection {
        eprintln!(
            "Warning: found {} card candidates for {} slots, kept the largest",
            candidates,
            config.grid.cells()
        );
    }

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", cli.output_dir))?;

    for (outcome, output) in report.succeeded() {
        let card_path = cli.card_path(&outcome.label);
        output
            .card
            .save(&card_path)
            .with_context(|| format!("Failed to save card: {:?}", card_path))?;

        let logo_path = cli.logo_path(&outcome.label);
        output
            .crop
            .save(&logo_path)
            .with_context(|| format!("Failed to save logo: {:?}", logo_path))?;

        eprintln!(
            "[{},{}] {}: card {}x{}, logo {}px via {:?}{} (diameter ratio {:.3})",
            outcome.row,
            outcome.col,
            outcome.label,
            output.card.width(),
            output.card.height(),
            output.crop_rect.side,
            output.region.source,
            if output.is_degraded() { ", degraded" } else { "" },
            output.diameter_ratio()
        );
    }

    let failed: Vec<_> = report.failed().collect();
    for (outcome, err) in &failed {
        eprintln!(
            "[{},{}] {}: failed: {}",
            outcome.row, outcome.col, outcome.label, err
        );
    }

    eprintln!();
    eprintln!(
        "Saved {} of {} cards to {:?}",
        report.cards.len() - failed.len(),
        report.cards.len(),
        cli.output_dir
    );

    Ok(())
}
