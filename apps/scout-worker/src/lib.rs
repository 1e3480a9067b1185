use std::{fs, path::PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use scout_service::{PipelineRequest, ScoutService};
use scout_storage::db::Db;

/// Runs the query-analysis pipeline for one request event and prints the
/// outcome as JSON.
#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Path to a JSON file with the request event (searchId, userId, query,
	/// flags).
	#[arg(value_name = "EVENT")]
	pub event: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<bool> {
	let config = scout_config::load(&args.config)?;

	init_tracing(&config)?;

	let raw = fs::read_to_string(&args.event)?;
	let request: PipelineRequest = serde_json::from_str(&raw)?;
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let service = ScoutService::new(config, &db);
	let response = service.run(request).await;

	println!("{}", serde_json::to_string_pretty(&response)?);

	Ok(response.success)
}

fn init_tracing(config: &scout_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
