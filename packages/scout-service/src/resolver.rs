//! Cache-aside resolution of entity enrichments.
//!
//! Both resolvers are total: every input name yields an output entry, with
//! generation failures degrading to empty enrichments. Cache writes are best
//! effort and never fail the pipeline.

use std::{collections::HashMap, sync::Arc};

use tokio::{sync::Semaphore, task::JoinSet};

use scout_config::LlmProviderConfig;
use scout_domain::{LocationAltNames, SkillCachePayload, location_alt_names_key, skill_key};
use scout_providers::CompletionOptions;

use crate::{CompletionProvider, EntityCache, prompts};

pub const BATCH_SIZE: usize = 3;
pub const MAX_CONCURRENT_BATCHES: usize = 5;

fn structured_output_options() -> CompletionOptions {
	CompletionOptions {
		fallback: true,
		stop: Some(prompts::STOP_OUTPUT.iter().map(|s| s.to_string()).collect()),
		..Default::default()
	}
}

/// Resolves alternative names for every location, preferring cached entries.
/// All misses go to the model in a single call; locations the model skips
/// come back with empty alternatives, and so does everything on failure.
pub async fn resolve_location_alt_names(
	completion: &Arc<dyn CompletionProvider>,
	cache: &Arc<dyn EntityCache>,
	cfg: &LlmProviderConfig,
	locations: &[String],
) -> Vec<LocationAltNames> {
	if locations.is_empty() {
		return Vec::new();
	}

	let keys = locations.iter().map(|name| location_alt_names_key(name)).collect::<Vec<_>>();
	let cached = match cache.multi_get(&keys).await {
		Ok(values) => values,
		Err(err) => {
			tracing::warn!(error = %err, "Cache read failed, regenerating all locations.");

			vec![None; locations.len()]
		},
	};
	let mut results: Vec<Option<LocationAltNames>> = vec![None; locations.len()];
	let mut to_generate = Vec::new();

	for (i, (name, value)) in locations.iter().zip(cached).enumerate() {
		match value.as_deref().map(serde_json::from_str::<Vec<String>>) {
			Some(Ok(alt_names)) =>
				results[i] = Some(LocationAltNames { name: name.clone(), alt_names }),
			Some(Err(err)) => {
				tracing::warn!(
					location = %name,
					error = %err,
					"Discarding undecodable cached alt names.",
				);

				to_generate.push(i);
			},
			None => to_generate.push(i),
		}
	}

	if !to_generate.is_empty() {
		let names = to_generate.iter().map(|&i| locations[i].clone()).collect::<Vec<_>>();
		let generated = generate_location_alt_names(completion.as_ref(), cfg, &names)
			.await
			.into_iter()
			.map(|item| (item.name, item.alt_names))
			.collect::<HashMap<_, _>>();

		for &i in &to_generate {
			let name = &locations[i];
			let alt_names = generated.get(name).cloned().unwrap_or_default();

			if let Ok(payload) = serde_json::to_string(&alt_names)
				&& let Err(err) = cache.set(&keys[i], &payload).await
			{
				tracing::warn!(location = %name, error = %err, "Failed to cache alt names.");
			}

			results[i] = Some(LocationAltNames { name: name.clone(), alt_names });
		}
	}

	results
		.into_iter()
		.zip(locations)
		.map(|(slot, name)| {
			slot.unwrap_or_else(|| LocationAltNames {
				name: name.clone(),
				alt_names: Vec::new(),
			})
		})
		.collect()
}

async fn generate_location_alt_names(
	completion: &dyn CompletionProvider,
	cfg: &LlmProviderConfig,
	locations: &[String],
) -> Vec<LocationAltNames> {
	tracing::info!(count = locations.len(), "Generating location alternative names.");

	let messages = prompts::location_messages(locations);
	let opts = structured_output_options();
	let text = match completion.complete(cfg, &messages, &opts).await {
		Ok(text) => text,
		Err(err) => {
			tracing::error!(error = %err, "Location alt name generation failed.");

			return Vec::new();
		},
	};
	// The stop sequence swallowed the closing tag; restore it before parsing.
	let closed = format!("{text}{}", prompts::STOP_OUTPUT[0]);
	let outcome = scout_domain::parse_location_output(&closed);

	if let Some(reason) = outcome.reason() {
		tracing::warn!(reason, "Recovered from unparseable location output.");
	}

	outcome.into_value()
}

/// Resolves descriptions for every skill name, preferring cached entries.
/// Misses are generated in batches of [`BATCH_SIZE`] with bounded
/// concurrency; a failed batch degrades its skills to empty descriptions.
pub async fn resolve_skill_descriptions(
	completion: &Arc<dyn CompletionProvider>,
	cache: &Arc<dyn EntityCache>,
	cfg: &LlmProviderConfig,
	skills: &[String],
) -> HashMap<String, SkillCachePayload> {
	let mut descriptions = HashMap::new();

	if skills.is_empty() {
		return descriptions;
	}

	let keys = skills.iter().map(|name| skill_key(name)).collect::<Vec<_>>();
	let cached = match cache.multi_get(&keys).await {
		Ok(values) => values,
		Err(err) => {
			tracing::warn!(error = %err, "Cache read failed, regenerating all skills.");

			vec![None; skills.len()]
		},
	};
	let mut uncached = Vec::new();

	for (name, value) in skills.iter().zip(cached) {
		match value.as_deref().map(serde_json::from_str::<SkillCachePayload>) {
			Some(Ok(payload)) => {
				descriptions.insert(name.clone(), payload);
			},
			Some(Err(err)) => {
				tracing::warn!(
					skill = %name,
					error = %err,
					"Discarding undecodable cached skill payload.",
				);

				if !uncached.contains(name) {
					uncached.push(name.clone());
				}
			},
			None =>
				if !uncached.contains(name) {
					uncached.push(name.clone());
				},
		}
	}

	tracing::info!(
		hits = descriptions.len(),
		misses = uncached.len(),
		"Resolved skill descriptions from cache.",
	);

	let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_BATCHES));
	let mut tasks = JoinSet::new();

	for batch in uncached.chunks(BATCH_SIZE) {
		let batch = batch.to_vec();
		let completion = completion.clone();
		let cache = cache.clone();
		let cfg = cfg.clone();
		let semaphore = semaphore.clone();

		tasks.spawn(async move {
			let Ok(_permit) = semaphore.acquire_owned().await else {
				return HashMap::new();
			};

			generate_skill_batch(completion.as_ref(), cache.as_ref(), &cfg, &batch).await
		});
	}

	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok(generated) => descriptions.extend(generated),
			Err(err) => tracing::error!(error = %err, "Skill description batch task failed."),
		}
	}

	for name in skills {
		descriptions.entry(name.clone()).or_default();
	}

	descriptions
}

async fn generate_skill_batch(
	completion: &dyn CompletionProvider,
	cache: &dyn EntityCache,
	cfg: &LlmProviderConfig,
	batch: &[String],
) -> HashMap<String, SkillCachePayload> {
	tracing::info!(?batch, "Generating skill descriptions for batch.");

	let messages = prompts::keyword_messages(batch);
	let opts = structured_output_options();
	let text = match completion.complete(cfg, &messages, &opts).await {
		Ok(text) => text,
		Err(err) => {
			tracing::error!(error = %err, "Skill description generation failed.");

			return HashMap::new();
		},
	};
	let closed = format!("{text}{}", prompts::STOP_OUTPUT[0]);
	let outcome = scout_domain::parse_keyword_output(&closed);

	if let Some(reason) = outcome.reason() {
		tracing::warn!(reason, "Recovered from unparseable keyword output.");
	}

	let mut generated = HashMap::new();

	for (name, description) in outcome.into_value() {
		let payload = SkillCachePayload { description, embeddings: None };

		if let Ok(encoded) = serde_json::to_string(&payload)
			&& let Err(err) = cache.set(&skill_key(&name), &encoded).await
		{
			tracing::warn!(skill = %name, error = %err, "Failed to cache skill description.");
		}

		generated.insert(name, payload);
	}

	generated
}
