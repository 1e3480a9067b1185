use std::sync::{Arc, atomic::Ordering};

use serde_json::Value;

use scout_domain::{RelatedRole, Temporal};
use scout_service::{AnalysisOptions, ScoutService};
use scout_testkit::{
	FailingCompletion, MemoryCache, MemorySearchStore, OfflineCache, StubCompletion, test_config,
};

fn service(svc_completion: Arc<StubCompletion>, cache: Arc<MemoryCache>) -> ScoutService {
	ScoutService::with_parts(
		test_config(),
		Arc::new(MemorySearchStore::new()),
		cache,
		svc_completion,
	)
}

fn default_options(svc: &ScoutService) -> AnalysisOptions {
	svc.analysis_options(&Value::Null)
}

fn breakdown_fixture() -> String {
	serde_json::json!({
		"query_breakdown": {
			"key_components": ["machine learning", "new york"],
			"analysis": "Seeks ML practitioners in New York."
		},
		"response": {
			"regionBasedQuery": 1,
			"locationDetails": {
				"operator": "OR",
				"locations": [{ "name": "New York City" }]
			},
			"skillBasedQuery": 1,
			"skillDetails": {
				"operator": "AND",
				"skills": [{
					"name": "Machine Learning",
					"temporal": "current",
					"relatedRoles": ["ML Engineer"]
				}]
			},
			"dbBasedQuery": 1,
			"dbQueryDetails": {
				"operator": "AND",
				"queries": [{
					"field": "education.schoolName",
					"regex": "(?i)stanford",
					"description": "Studied at Stanford"
				}]
			}
		}
	})
	.to_string()
}

const NYC_XML: &str = "\
<output>
  <location>
    <name>New York City</name>
    <alt_names>
      <alt_name>NYC</alt_name>
      <alt_name>The Big Apple</alt_name>
    </alt_names>
  </location>
</output>";

#[tokio::test]
async fn analysis_enriches_locations_and_skills() {
	let completion =
		Arc::new(StubCompletion::new(breakdown_fixture()).with_location(NYC_XML));
	let cache = Arc::new(MemoryCache::new());
	let svc = service(completion.clone(), cache.clone());
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("ml people in nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");

	let location = &response.location_details.locations[0];
	assert_eq!(location.alt_names.as_deref(), Some(&["NYC".to_string(), "The Big Apple".to_string()][..]));

	let skill = &response.skill_details.skills[0];
	assert_eq!(skill.description.as_deref(), Some("Machine Learning description."));
	assert_eq!(skill.cache_key.as_deref(), Some("skill:machine learning"));
	assert_eq!(skill.temporal, Temporal::Current);

	// Without alternative_skills the related roles are left as-is.
	assert!(matches!(skill.related_roles[0], RelatedRole::Plain(_)));

	// The dbQuery field fixup ran before enrichment.
	assert_eq!(response.db_query_details.queries[0].field, "education.school");

	assert_eq!(completion.breakdown_calls.load(Ordering::SeqCst), 1);
	assert_eq!(completion.location_calls.load(Ordering::SeqCst), 1);
	assert_eq!(completion.keyword_calls.load(Ordering::SeqCst), 1);

	// Both enrichments were cached for the next query.
	assert!(cache.payload("location_alt_names:new york city").is_some());
	assert!(cache.payload("skill:machine learning").is_some());
}

#[tokio::test]
async fn alternative_skills_rewrite_related_roles() {
	let completion =
		Arc::new(StubCompletion::new(breakdown_fixture()).with_location(NYC_XML));
	let cache = Arc::new(MemoryCache::new());
	let svc = service(completion, cache);
	let opts = svc.analysis_options(&serde_json::json!({ "alternative_skills": true }));
	let breakdown = svc.analyze_query("ml people in nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");
	let skill = &response.skill_details.skills[0];

	let RelatedRole::Named(role) = &skill.related_roles[0] else {
		panic!("related roles should be rewritten to records");
	};
	assert_eq!(role.name, "ML Engineer");
	assert_eq!(role.description.as_deref(), Some("ML Engineer description."));
	assert_eq!(role.cache_key.as_deref(), Some("skill:ml engineer"));
}

#[tokio::test]
async fn cached_entities_skip_generation() {
	let cache = Arc::new(MemoryCache::new());

	{
		let completion =
			Arc::new(StubCompletion::new(breakdown_fixture()).with_location(NYC_XML));
		let svc = service(completion.clone(), cache.clone());
		let opts = default_options(&svc);

		svc.analyze_query("ml people in nyc", &opts).await;

		assert_eq!(completion.location_calls.load(Ordering::SeqCst), 1);
	}

	// Same entities again, now warm.
	let completion = Arc::new(StubCompletion::new(breakdown_fixture()));
	let svc = service(completion.clone(), cache);
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("ml people in nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");

	assert_eq!(
		response.location_details.locations[0].alt_names.as_deref(),
		Some(&["NYC".to_string(), "The Big Apple".to_string()][..])
	);
	assert_eq!(response.skill_details.skills[0].description.as_deref(), Some("Machine Learning description."));
	assert_eq!(completion.location_calls.load(Ordering::SeqCst), 0);
	assert_eq!(completion.keyword_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn location_cache_keys_normalize_case_and_punctuation() {
	let cache = Arc::new(MemoryCache::new());
	let fixture = |name: &str| {
		serde_json::json!({
			"response": {
				"regionBasedQuery": 1,
				"locationDetails": { "operator": "OR", "locations": [{ "name": name }] }
			}
		})
		.to_string()
	};

	{
		let completion = Arc::new(
			StubCompletion::new(fixture("NYC")).with_location(
				"<output><location><name>NYC</name><alt_names><alt_name>New York City</alt_name></alt_names></location></output>",
			),
		);
		let svc = service(completion.clone(), cache.clone());
		let opts = default_options(&svc);

		svc.analyze_query("nyc", &opts).await;

		assert_eq!(completion.location_calls.load(Ordering::SeqCst), 1);
	}

	// "nyc!" normalizes to the same cache key as "NYC".
	let completion = Arc::new(StubCompletion::new(fixture("nyc!")));
	let svc = service(completion.clone(), cache);
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("nyc!", &opts).await;
	let response = breakdown.response.expect("response should be present");

	assert_eq!(
		response.location_details.locations[0].alt_names.as_deref(),
		Some(&["New York City".to_string()][..])
	);
	assert_eq!(completion.location_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn truncated_location_output_degrades_to_empty_alt_names() {
	let completion = Arc::new(
		StubCompletion::new(breakdown_fixture())
			.with_location("<output><location><name>New York City</name>"),
	);
	let cache = Arc::new(MemoryCache::new());
	let svc = service(completion, cache);
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("ml people in nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");

	assert_eq!(
		response.location_details.locations[0].alt_names.as_deref(),
		Some(&[] as &[String])
	);
}

#[tokio::test]
async fn failed_skill_batches_degrade_to_empty_descriptions() {
	let completion = Arc::new(
		StubCompletion::new(breakdown_fixture()).with_location(NYC_XML).failing_keywords(),
	);
	let cache = Arc::new(MemoryCache::new());
	let svc = service(completion, cache.clone());
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("ml people in nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");
	let skill = &response.skill_details.skills[0];

	// Every skill still gets an entry; nothing bogus is cached.
	assert_eq!(skill.description.as_deref(), Some(""));
	assert_eq!(skill.cache_key.as_deref(), Some("skill:machine learning"));
	assert!(cache.payload("skill:machine learning").is_none());
}

#[tokio::test]
async fn skills_are_generated_in_batches_of_three() {
	let skills = (1..=7)
		.map(|i| serde_json::json!({ "name": format!("Skill {i}") }))
		.collect::<Vec<_>>();
	let fixture = serde_json::json!({
		"response": {
			"skillBasedQuery": 1,
			"skillDetails": { "operator": "AND", "skills": skills }
		}
	})
	.to_string();
	let completion = Arc::new(StubCompletion::new(fixture));
	let cache = Arc::new(MemoryCache::new());
	let svc = service(completion.clone(), cache);
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("many skills", &opts).await;
	let response = breakdown.response.expect("response should be present");

	assert_eq!(completion.keyword_calls.load(Ordering::SeqCst), 3);

	for (i, skill) in response.skill_details.skills.iter().enumerate() {
		let name = format!("Skill {}", i + 1);

		assert_eq!(skill.description.as_deref(), Some(format!("{name} description.").as_str()));
	}
}

#[tokio::test]
async fn duplicate_location_variants_share_one_generation_call() {
	let fixture = serde_json::json!({
		"response": {
			"regionBasedQuery": 1,
			"locationDetails": {
				"operator": "OR",
				"locations": [{ "name": "NYC" }, { "name": "nyc" }]
			}
		}
	})
	.to_string();
	let completion = Arc::new(StubCompletion::new(fixture).with_location(
		"<output>\
		 <location><name>NYC</name><alt_names><alt_name>New York City</alt_name></alt_names></location>\
		 <location><name>nyc</name><alt_names><alt_name>New York City</alt_name></alt_names></location>\
		 </output>",
	));
	let cache = Arc::new(MemoryCache::new());
	let svc = service(completion.clone(), cache.clone());
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");

	// Both surface variants ride the same generation call.
	assert_eq!(completion.location_calls.load(Ordering::SeqCst), 1);

	for location in &response.location_details.locations {
		assert_eq!(
			location.alt_names.as_deref(),
			Some(&["New York City".to_string()][..]),
			"location {} should be populated",
			location.name
		);
	}

	// And collapse to a single normalized cache entry.
	assert_eq!(cache.len(), 1);
	assert!(cache.payload("location_alt_names:nyc").is_some());
}

#[tokio::test]
async fn offline_cache_never_blocks_enrichment() {
	let completion =
		Arc::new(StubCompletion::new(breakdown_fixture()).with_location(NYC_XML));
	let svc = ScoutService::with_parts(
		test_config(),
		Arc::new(MemorySearchStore::new()),
		Arc::new(OfflineCache),
		completion,
	);
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("ml people in nyc", &opts).await;
	let response = breakdown.response.expect("response should be present");

	assert_eq!(
		response.location_details.locations[0].alt_names.as_deref(),
		Some(&["NYC".to_string(), "The Big Apple".to_string()][..])
	);
	assert_eq!(response.skill_details.skills[0].description.as_deref(), Some("Machine Learning description."));
}

#[tokio::test]
async fn provider_failure_degrades_to_empty_breakdown() {
	let svc = ScoutService::with_parts(
		test_config(),
		Arc::new(MemorySearchStore::new()),
		Arc::new(MemoryCache::new()),
		Arc::new(FailingCompletion),
	);
	let opts = default_options(&svc);
	let breakdown = svc.analyze_query("anything at all", &opts).await;
	let response = breakdown.response.expect("fallback still carries a response");

	assert_eq!(response.region_based_query, 0);
	assert_eq!(response.organisation_based_query, 0);
	assert_eq!(response.sector_based_query, 0);
	assert_eq!(response.skill_based_query, 0);
	assert_eq!(response.db_based_query, 0);
}

/// Answers each breakdown call with the query echoed back into the analysis
/// field, so batch tests can tell results apart.
struct EchoCompletion;
impl scout_service::CompletionProvider for EchoCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a scout_config::LlmProviderConfig,
		messages: &'a [Value],
		_opts: &'a scout_providers::CompletionOptions,
	) -> scout_service::BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			let prompt = messages
				.last()
				.and_then(|message| message.get("content"))
				.and_then(Value::as_str)
				.unwrap_or_default();
			let query = prompt
				.split("<query>")
				.nth(1)
				.and_then(|rest| rest.split("</query>").next())
				.unwrap_or_default();

			if query.contains("boom") {
				return Err(color_eyre::eyre::eyre!("Scripted failure."));
			}

			Ok(serde_json::json!({
				"query_breakdown": { "key_components": [], "analysis": query },
				"response": {}
			})
			.to_string())
		})
	}
}

#[tokio::test]
async fn batch_analysis_preserves_input_order() {
	let svc = Arc::new(ScoutService::with_parts(
		test_config(),
		Arc::new(MemorySearchStore::new()),
		Arc::new(MemoryCache::new()),
		Arc::new(EchoCompletion),
	));
	let opts = default_options(svc.as_ref());
	let queries = vec![
		"query one".to_string(),
		"query boom".to_string(),
		"query three".to_string(),
		"query four".to_string(),
	];
	let results = svc.analyze_batch(queries.clone(), opts, None).await;

	assert_eq!(results.len(), queries.len());
	assert_eq!(results[0].query_breakdown.analysis, "query one");
	// The failed query degrades to the empty breakdown in place.
	assert_eq!(results[1].query_breakdown.analysis, "");
	assert!(results[1].response.is_some());
	assert_eq!(results[2].query_breakdown.analysis, "query three");
	assert_eq!(results[3].query_breakdown.analysis, "query four");
}

/// Tracks how many completions are in flight at once across an await point.
struct GaugeCompletion {
	in_flight: std::sync::atomic::AtomicUsize,
	max_in_flight: std::sync::atomic::AtomicUsize,
}
impl scout_service::CompletionProvider for GaugeCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a scout_config::LlmProviderConfig,
		_messages: &'a [Value],
		_opts: &'a scout_providers::CompletionOptions,
	) -> scout_service::BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.max_in_flight.fetch_max(now, Ordering::SeqCst);
			tokio::task::yield_now().await;
			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			Ok(serde_json::json!({
				"query_breakdown": { "key_components": [], "analysis": "ok" },
				"response": {}
			})
			.to_string())
		})
	}
}

#[tokio::test]
async fn batch_concurrency_override_caps_in_flight_analyses() {
	let completion = Arc::new(GaugeCompletion {
		in_flight: std::sync::atomic::AtomicUsize::new(0),
		max_in_flight: std::sync::atomic::AtomicUsize::new(0),
	});
	let svc = Arc::new(ScoutService::with_parts(
		test_config(),
		Arc::new(MemorySearchStore::new()),
		Arc::new(MemoryCache::new()),
		completion.clone(),
	));
	let opts = default_options(svc.as_ref());
	let queries = (1..=6).map(|i| format!("query {i}")).collect::<Vec<_>>();
	// The configured default is 5; the caller narrows it to 1.
	let results = svc.analyze_batch(queries, opts, Some(1)).await;

	assert_eq!(results.len(), 6);
	assert_eq!(completion.max_in_flight.load(Ordering::SeqCst), 1);
}
