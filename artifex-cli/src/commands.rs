//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use artifex_core::config::{AppConfig, write_default_config};
use artifex_core::gateway::{AppState, run};
use artifex_ml::features::{MarketReference, load_market_reference};
use artifex_ml::image::analyze_image;
use artifex_ml::inference::ImageAnalysis;
use artifex_ml::{FeatureBuilder, FeatureSchema, ListingRecord, PredictionService};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a handler needs: the workspace and the loaded configuration.
pub struct CommandContext {
    pub workspace: PathBuf,
    pub config: anyhow::Result<AppConfig>,
}

impl CommandContext {
    fn config(self) -> anyhow::Result<AppConfig> {
        let config = self.config?;
        config.validate()?;
        Ok(config)
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, ctx: CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::Serve { .. } => handle_serve(ctx.config()?).await,
        Commands::Predict { listing, image } => {
            handle_predict(ctx.config()?, &listing, image.as_deref())
        }
        Commands::AnalyzeImage { path } => handle_analyze_image(ctx.config()?, &path),
        Commands::Featurize { records, out } => {
            handle_featurize(ctx.config()?, &records, out.as_deref())
        }
        Commands::Validate => handle_validate(ctx.config()?),
        Commands::Config { action } => handle_config(action, ctx),
    }
}

fn load_service(config: &AppConfig) -> anyhow::Result<Arc<PredictionService>> {
    let service = PredictionService::from_config(&config.ml).map_err(|e| {
        anyhow::anyhow!(
            "Cannot load artifacts from {}: {e}",
            config.ml.artifacts.dir.display()
        )
    })?;
    Ok(Arc::new(service))
}

async fn handle_serve(config: AppConfig) -> anyhow::Result<()> {
    // Artifacts are loaded and cross-checked before the socket is bound.
    let service = load_service(&config)?;
    let state = AppState::new(service, &config.gateway);
    println!("Artifex listening on http://{}", config.gateway.bind_addr());
    run(state, &config.gateway).await?;
    Ok(())
}

fn handle_predict(config: AppConfig, listing: &Path, image: Option<&Path>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(listing)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", listing.display()))?;
    let record: ListingRecord = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid listing {}: {e}", listing.display()))?;
    let image_bytes = image
        .map(|path| {
            std::fs::read(path).map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))
        })
        .transpose()?;

    let service = load_service(&config)?;
    let result = service.predict(&record, image_bytes.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn handle_analyze_image(config: AppConfig, path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
    let features = analyze_image(&bytes, &config.ml.image)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&ImageAnalysis::from(features))?
    );
    Ok(())
}

fn handle_featurize(config: AppConfig, records: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let schema = FeatureSchema::load(&config.ml.artifacts.schema_path())?;
    let builder = FeatureBuilder::new(&schema)?;
    let market = load_market_reference(&config.ml.market)?;

    let input = BufReader::new(
        std::fs::File::open(records)
            .map_err(|e| anyhow::anyhow!("Cannot open {}: {e}", records.display()))?,
    );
    let rows = match out {
        Some(path) => {
            let mut writer = BufWriter::new(std::fs::File::create(path)?);
            let rows = featurize_lines(&builder, market.as_ref(), input, &mut writer)?;
            writer.flush()?;
            rows
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            featurize_lines(&builder, market.as_ref(), input, &mut writer)?
        }
    };
    tracing::info!(rows, features = builder.n_features(), "Featurized listings");
    Ok(())
}

/// Write a header row of feature names, then one JSON array per listing.
///
/// Blank lines are skipped; a malformed line fails with its line number.
fn featurize_lines<R: BufRead, W: Write>(
    builder: &FeatureBuilder,
    market: &dyn MarketReference,
    input: R,
    out: &mut W,
) -> anyhow::Result<usize> {
    serde_json::to_writer(&mut *out, &builder.feature_names()[..])?;
    writeln!(out)?;

    let mut rows = 0;
    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ListingRecord = serde_json::from_str(&line)
            .map_err(|e| anyhow::anyhow!("line {}: {e}", index + 1))?;
        let vector = builder.build(&record, None, market)?;
        serde_json::to_writer(&mut *out, &vector.to_json_row())?;
        writeln!(out)?;
        rows += 1;
    }
    Ok(rows)
}

fn handle_validate(config: AppConfig) -> anyhow::Result<()> {
    let service = load_service(&config)?;
    let info = service.model_info();
    let bundle = service.bundle();

    // Smoke test: the all-defaults listing must score.
    let smoke = service.predict(&ListingRecord::default(), None)?;

    println!("Artifacts OK: {}", bundle.source_dir.display());
    println!("  model type:      {}", info.model_type);
    println!("  format:          {}", info.model_format);
    println!("  features:        {}", info.n_features);
    println!("  categorical:     {}", info.categorical_indices.len());
    println!("  encoding:        {:?}", info.encoding);
    println!("  preprocessor:    {}", info.preprocessor);
    println!(
        "  transform:       {} / {}",
        info.target_transformation, info.inverse_transformation
    );
    if let Some(r2) = info.r2_score {
        println!("  r2 score:        {r2:.4}");
    }
    println!("  fingerprint:     {}", info.artifact_fingerprint);
    println!("  default listing: {:.2}", smoke.point_estimate);
    Ok(())
}

fn handle_config(action: ConfigAction, ctx: CommandContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = write_default_config(&ctx.workspace, force)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = ctx.config?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
