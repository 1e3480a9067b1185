//! Two-phase query analysis: a structured breakdown from the model, then
//! concurrent cache-aside enrichment of its location and skill categories.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use time::{OffsetDateTime, macros::format_description};
use tokio::{sync::Semaphore, task::JoinSet};

use scout_config::LlmProviderConfig;
use scout_domain::{
	CategoryResponse, LocationDetails, NamedRole, QueryBreakdown, RelatedRole, SkillDetails,
	normalize_db_query_fields, parse_breakdown, skill_key,
};
use scout_providers::CompletionOptions;

use crate::{ScoutService, prompts, resolver};

/// Per-analysis knobs. Defaults come from the `analysis` config section;
/// request flags may override them.
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
	pub hyde_provider: String,
	pub description_provider: String,
	pub alternative_skills: bool,
}

impl ScoutService {
	/// Resolves analysis options from request flags, falling back to the
	/// configured defaults for anything the flags leave unset.
	pub fn analysis_options(&self, flags: &Value) -> AnalysisOptions {
		let flag_str = |key: &str| {
			flags.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
		};

		AnalysisOptions {
			hyde_provider: flag_str("hyde_provider")
				.unwrap_or(&self.cfg.analysis.hyde_provider)
				.to_string(),
			description_provider: flag_str("description_provider")
				.unwrap_or(&self.cfg.analysis.description_provider)
				.to_string(),
			alternative_skills: flags
				.get("alternative_skills")
				.and_then(Value::as_bool)
				.unwrap_or(self.cfg.analysis.alternative_skills),
		}
	}

	/// Analyzes one query. This is total: provider failures and malformed
	/// output degrade to the validly-shaped empty breakdown, so every call
	/// yields a result with all five category flags present.
	pub async fn analyze_query(&self, query: &str, opts: &AnalysisOptions) -> QueryBreakdown {
		tracing::info!(query, "Starting query analysis.");

		let mut breakdown = self.breakdown_step(query, opts).await;
		let Some(response) = breakdown.response.as_mut() else {
			tracing::warn!("Breakdown carries no response section, skipping enrichment.");

			return breakdown;
		};

		normalize_db_query_fields(response);

		let description_cfg = match self.cfg.provider(&opts.description_provider) {
			Ok(cfg) => cfg,
			Err(err) => {
				tracing::error!(error = %err, "Description provider is not configured.");

				return breakdown;
			},
		};
		let enrich_locations = response.region_based_query == 1;
		let enrich_skills = response.skill_based_query == 1;
		let CategoryResponse { location_details, skill_details, .. } = response;

		tokio::join!(
			self.enrich_locations(enrich_locations, location_details, description_cfg),
			self.enrich_skills(
				enrich_skills,
				skill_details,
				description_cfg,
				opts.alternative_skills,
			),
		);

		tracing::info!("Completed query analysis and enrichment.");

		breakdown
	}

	/// Analyzes many queries with bounded concurrency. The limit defaults to
	/// the configured `max_concurrent_queries`; callers may override it per
	/// batch. Output order matches input order; a panicked analysis degrades
	/// to the empty breakdown.
	pub async fn analyze_batch(
		self: Arc<Self>,
		queries: Vec<String>,
		opts: AnalysisOptions,
		max_concurrent: Option<usize>,
	) -> Vec<QueryBreakdown> {
		let limit =
			max_concurrent.unwrap_or(self.cfg.analysis.max_concurrent_queries as usize).max(1);
		let semaphore = Arc::new(Semaphore::new(limit));
		let mut results = vec![QueryBreakdown::empty(); queries.len()];
		let mut tasks = JoinSet::new();

		for (i, query) in queries.into_iter().enumerate() {
			let svc = self.clone();
			let semaphore = semaphore.clone();
			let opts = opts.clone();

			tasks.spawn(async move {
				let Ok(_permit) = semaphore.acquire_owned().await else {
					return (i, QueryBreakdown::empty());
				};

				(i, svc.analyze_query(&query, &opts).await)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((i, breakdown)) => results[i] = breakdown,
				Err(err) => tracing::error!(error = %err, "Query analysis task failed."),
			}
		}

		results
	}

	async fn breakdown_step(&self, query: &str, opts: &AnalysisOptions) -> QueryBreakdown {
		let cfg = match self.cfg.provider(&opts.hyde_provider) {
			Ok(cfg) => cfg,
			Err(err) => {
				tracing::error!(error = %err, "Breakdown provider is not configured.");

				return QueryBreakdown::empty();
			},
		};
		let current_date = OffsetDateTime::now_utc()
			.format(format_description!("[year]-[month]-[day]"))
			.unwrap_or_default();
		let messages = prompts::breakdown_messages(query, &current_date);
		let opts = CompletionOptions {
			fallback: true,
			temperature: Some(0.0),
			response_format: Some(serde_json::json!({ "type": "json_object" })),
			..Default::default()
		};
		let text = match self.completion.complete(cfg, &messages, &opts).await {
			Ok(text) => text,
			Err(err) => {
				tracing::error!(error = %err, "Breakdown completion failed.");

				return QueryBreakdown::empty();
			},
		};
		let outcome = parse_breakdown(&text);

		if let Some(reason) = outcome.reason() {
			tracing::warn!(reason, "Recovered from unparseable breakdown output.");
		}

		outcome.into_value()
	}

	async fn enrich_locations(
		&self,
		enabled: bool,
		details: &mut LocationDetails,
		cfg: &LlmProviderConfig,
	) {
		if !enabled {
			return;
		}

		let names = details
			.locations
			.iter()
			.filter(|location| !location.name.is_empty())
			.map(|location| location.name.clone())
			.collect::<Vec<_>>();

		if names.is_empty() {
			return;
		}

		let resolved =
			resolver::resolve_location_alt_names(&self.completion, &self.cache, cfg, &names)
				.await
				.into_iter()
				.map(|item| (item.name, item.alt_names))
				.collect::<HashMap<_, _>>();

		for location in &mut details.locations {
			if let Some(alt_names) = resolved.get(&location.name) {
				location.alt_names = Some(alt_names.clone());
			}
		}
	}

	async fn enrich_skills(
		&self,
		enabled: bool,
		details: &mut SkillDetails,
		cfg: &LlmProviderConfig,
		alternative_skills: bool,
	) {
		if !enabled {
			return;
		}

		let mut to_fetch = details
			.skills
			.iter()
			.filter(|skill| !skill.name.is_empty())
			.map(|skill| skill.name.clone())
			.collect::<Vec<_>>();

		if alternative_skills {
			for skill in &details.skills {
				to_fetch.extend(skill.related_roles.iter().map(RelatedRole::canonical_name));
			}
		}
		if to_fetch.is_empty() {
			return;
		}

		let resolved =
			resolver::resolve_skill_descriptions(&self.completion, &self.cache, cfg, &to_fetch)
				.await;

		for skill in &mut details.skills {
			let description =
				resolved.get(&skill.name).map(|payload| payload.description.clone());

			skill.description = Some(description.unwrap_or_default());
			// Downstream stages fetch embeddings by this key instead of
			// carrying them inline.
			skill.cache_key = Some(skill_key(&skill.name));

			if alternative_skills {
				skill.related_roles = skill
					.related_roles
					.iter()
					.map(|role| {
						let name = role.canonical_name();
						let description = resolved
							.get(&name)
							.map(|payload| payload.description.clone())
							.unwrap_or_default();
						let cache_key = Some(skill_key(&name));

						RelatedRole::Named(NamedRole {
							name,
							description: Some(description),
							cache_key,
						})
					})
					.collect();
			}
		}
	}
}
