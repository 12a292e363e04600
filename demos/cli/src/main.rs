mod cli;
mod config;
mod loader;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use census_fhir::{condition_breakdown, condition_overview};
use cli::{selected_condition, Args, Command, OutputFormat};
use config::Config;
use loader::Loader;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LOAD_FAILURE: &str = "Error loading data.";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let mut config = Config::load_or_default(args.config.as_deref())?;
    config.merge_with_args(&args);
    debug!("Configuration: {:?}", config);

    let loader = Loader::new(config.http.timeout()).context("Không khởi tạo được HTTP client")?;

    match &args.command {
        Command::Top { .. } => run_top(&loader, &config, args.format).await,
        Command::Drilldown { condition, query } => {
            let condition = selected_condition(condition.as_deref(), query.as_deref())
                .with_context(|| {
                    format!(
                        "Chuỗi truy vấn không có tham số `condition`: {}",
                        query.as_deref().unwrap_or_default()
                    )
                })?;
            run_drilldown(&loader, &config, &condition, args.format).await
        }
    }
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn run_top(loader: &Loader, config: &Config, format: OutputFormat) -> Result<()> {
    let conditions = loader
        .load_conditions(&config.sources)
        .await
        .context(LOAD_FAILURE)?;

    let overview = condition_overview(&conditions, &config.census);
    info!(
        "Ranked {} of {} distinct conditions",
        overview.conditions.len(),
        overview.distinct_conditions
    );

    match format {
        OutputFormat::Text => print!("{}", render::render_overview(&overview)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&overview)?),
    }
    Ok(())
}

async fn run_drilldown(
    loader: &Loader,
    config: &Config,
    condition: &str,
    format: OutputFormat,
) -> Result<()> {
    info!("Selected condition: {condition}");

    let documents = loader
        .load_drilldown(&config.sources)
        .await
        .context(LOAD_FAILURE)?;

    let outcome = condition_breakdown(
        &documents.conditions,
        &documents.patients,
        &documents.encounters,
        condition,
        &config.census,
    );

    match format {
        OutputFormat::Text => print!("{}", render::render_outcome(&outcome)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(())
}
