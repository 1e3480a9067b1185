mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Analysis, Config, LlmProviderConfig, Postgres, Providers, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.catalog.is_empty() {
		return Err(Error::Validation {
			message: "providers.catalog must contain at least one entry.".to_string(),
		});
	}

	for (provider_id, entry) in &cfg.providers.catalog {
		if entry.model.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {provider_id} model must be non-empty."),
			});
		}
		if entry.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {provider_id} api_key must be non-empty."),
			});
		}
		if entry.max_attempts == 0 {
			return Err(Error::Validation {
				message: format!("Provider {provider_id} max_attempts must be greater than zero."),
			});
		}
		if let Some(temperature) = entry.temperature
			&& !temperature.is_finite()
		{
			return Err(Error::Validation {
				message: format!("Provider {provider_id} temperature must be a finite number."),
			});
		}
	}

	for (label, provider_id) in [
		("analysis.hyde_provider", &cfg.analysis.hyde_provider),
		("analysis.description_provider", &cfg.analysis.description_provider),
	] {
		if !cfg.providers.catalog.contains_key(provider_id) {
			return Err(Error::Validation {
				message: format!("{label} {provider_id:?} is not present in providers.catalog."),
			});
		}
	}

	if cfg.analysis.max_concurrent_queries == 0 {
		return Err(Error::Validation {
			message: "analysis.max_concurrent_queries must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

impl Config {
	pub fn provider(&self, provider_id: &str) -> Result<&LlmProviderConfig> {
		self.providers
			.catalog
			.get(provider_id)
			.ok_or_else(|| Error::UnknownProvider { provider_id: provider_id.to_string() })
	}
}

fn normalize(cfg: &mut Config) {
	for entry in cfg.providers.catalog.values_mut() {
		if entry
			.fallback_model
			.as_deref()
			.map(|model| model.trim().is_empty())
			.unwrap_or(false)
		{
			entry.fallback_model = None;
		}
	}
}
