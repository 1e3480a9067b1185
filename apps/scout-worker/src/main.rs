use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
	color_eyre::install()?;

	let args = scout_worker::Args::parse();
	let success = scout_worker::run(args).await?;

	Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
