//! In-memory doubles for the pipeline's seams: a document store and entity
//! cache with the production guard semantics, and completion providers that
//! answer by prompt shape while counting calls.

use std::{
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::{Map, Value};

use scout_config::{
	Analysis, Config, LlmProviderConfig, Postgres, Providers, Service, Storage,
};
use scout_providers::CompletionOptions;
use scout_service::{BoxFuture, CompletionProvider, EntityCache, SearchDocumentStore};
use scout_storage::models::{self, SearchEvent, SearchStatus};

pub fn test_provider() -> LlmProviderConfig {
	LlmProviderConfig {
		model: "test-model".to_string(),
		fallback_model: None,
		api_base: "http://localhost:9".to_string(),
		api_key: "test-key".to_string(),
		path: "/chat/completions".to_string(),
		max_tokens: Some(1_024),
		temperature: None,
		max_attempts: 1,
		timeout_ms: 5_000,
		default_headers: Map::new(),
	}
}

pub fn test_config() -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://localhost/unused".to_string(),
				pool_max_conns: 1,
			},
		},
		providers: Providers {
			catalog: HashMap::from([("test".to_string(), test_provider())]),
		},
		analysis: Analysis {
			hyde_provider: "test".to_string(),
			description_provider: "test".to_string(),
			alternative_skills: false,
			max_concurrent_queries: 5,
		},
	}
}

#[derive(Default)]
pub struct MemoryCache {
	entries: Mutex<HashMap<String, String>>,
	pub sets: AtomicUsize,
}
impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, key: &str, payload: &str) {
		self.entries
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(key.to_string(), payload.to_string());
	}

	pub fn payload(&self, key: &str) -> Option<String> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).get(key).cloned()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl EntityCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, scout_storage::Result<Option<String>>> {
		Box::pin(async move { Ok(self.payload(key)) })
	}

	fn multi_get<'a>(
		&'a self,
		keys: &'a [String],
	) -> BoxFuture<'a, scout_storage::Result<Vec<Option<String>>>> {
		Box::pin(async move { Ok(keys.iter().map(|key| self.payload(key)).collect()) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		payload: &'a str,
	) -> BoxFuture<'a, scout_storage::Result<()>> {
		Box::pin(async move {
			self.sets.fetch_add(1, Ordering::SeqCst);
			self.insert(key, payload);

			Ok(())
		})
	}
}

/// A cache whose every operation fails, for exercising degraded paths.
pub struct OfflineCache;
impl EntityCache for OfflineCache {
	fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, scout_storage::Result<Option<String>>> {
		Box::pin(async { Err(scout_storage::Error::InvalidArgument("Cache offline.".to_string())) })
	}

	fn multi_get<'a>(
		&'a self,
		_keys: &'a [String],
	) -> BoxFuture<'a, scout_storage::Result<Vec<Option<String>>>> {
		Box::pin(async { Err(scout_storage::Error::InvalidArgument("Cache offline.".to_string())) })
	}

	fn set<'a>(
		&'a self,
		_key: &'a str,
		_payload: &'a str,
	) -> BoxFuture<'a, scout_storage::Result<()>> {
		Box::pin(async { Err(scout_storage::Error::InvalidArgument("Cache offline.".to_string())) })
	}
}

/// An in-memory search-document store with the same guard semantics as the
/// Postgres-backed one.
#[derive(Default)]
pub struct MemorySearchStore {
	docs: Mutex<HashMap<String, Value>>,
	pub updates: AtomicUsize,
}
impl MemorySearchStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn seed(&self, doc: Value) {
		let search_id = doc
			.get("searchId")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();

		self.docs.lock().unwrap_or_else(|err| err.into_inner()).insert(search_id, doc);
	}

	pub fn document(&self, search_id: &str) -> Option<Value> {
		self.docs.lock().unwrap_or_else(|err| err.into_inner()).get(search_id).cloned()
	}
}
impl SearchDocumentStore for MemorySearchStore {
	fn get<'a>(
		&'a self,
		search_id: &'a str,
	) -> BoxFuture<'a, scout_storage::Result<Option<Value>>> {
		Box::pin(async move { Ok(self.document(search_id)) })
	}

	fn create<'a>(&'a self, doc: &'a Value) -> BoxFuture<'a, scout_storage::Result<()>> {
		Box::pin(async move {
			let search_id = doc.get("searchId").and_then(Value::as_str).ok_or_else(|| {
				scout_storage::Error::InvalidArgument(
					"Document is missing a search id.".to_string(),
				)
			})?;

			models::status_of(doc)?;

			let mut docs = self.docs.lock().unwrap_or_else(|err| err.into_inner());

			if docs.contains_key(search_id) {
				return Err(scout_storage::Error::Conflict(format!(
					"Search document already exists: {search_id}."
				)));
			}

			docs.insert(search_id.to_string(), doc.clone());

			Ok(())
		})
	}

	fn update<'a>(
		&'a self,
		search_id: &'a str,
		set_fields: &'a Map<String, Value>,
		events: &'a [SearchEvent],
		expected_statuses: Option<&'a [SearchStatus]>,
	) -> BoxFuture<'a, scout_storage::Result<Value>> {
		Box::pin(async move {
			self.updates.fetch_add(1, Ordering::SeqCst);

			let mut docs = self.docs.lock().unwrap_or_else(|err| err.into_inner());
			let Some(doc) = docs.get_mut(search_id) else {
				return Err(scout_storage::Error::NotFound(format!(
					"Search document not found: {search_id}."
				)));
			};

			if let Some(expected) = expected_statuses {
				let current = models::status_of(doc)?;

				if !expected.contains(&current) {
					let expected = expected
						.iter()
						.map(SearchStatus::as_str)
						.collect::<Vec<_>>()
						.join(", ");

					return Err(scout_storage::Error::Conflict(format!(
						"Search {search_id} has status {current}, expected one of [{expected}]."
					)));
				}
			}

			models::apply_set_fields(doc, set_fields);
			models::append_events(doc, events)?;
			models::status_of(doc)?;

			Ok(doc.clone())
		})
	}
}

/// A completion provider that answers each call by inspecting the last
/// message: location prompts get canned XML, keyword prompts get synthesized
/// descriptions for the requested names, everything else gets the scripted
/// breakdown. Each path has its own call counter.
pub struct StubCompletion {
	breakdown: String,
	location: String,
	fail_keywords: bool,
	pub calls: AtomicUsize,
	pub breakdown_calls: AtomicUsize,
	pub location_calls: AtomicUsize,
	pub keyword_calls: AtomicUsize,
	pub prompts: Mutex<Vec<String>>,
}
impl StubCompletion {
	pub fn new(breakdown: impl Into<String>) -> Self {
		Self {
			breakdown: breakdown.into(),
			location: "<output></output>".to_string(),
			fail_keywords: false,
			calls: AtomicUsize::new(0),
			breakdown_calls: AtomicUsize::new(0),
			location_calls: AtomicUsize::new(0),
			keyword_calls: AtomicUsize::new(0),
			prompts: Mutex::new(Vec::new()),
		}
	}

	pub fn with_location(mut self, xml: impl Into<String>) -> Self {
		self.location = xml.into();

		self
	}

	pub fn failing_keywords(mut self) -> Self {
		self.fail_keywords = true;

		self
	}

	fn synthesize_keyword_output(prompt: &str) -> String {
		let mut entries = String::new();

		for segment in prompt.split("<keyword>").skip(1) {
			let Some(name) = segment.split("</keyword>").next() else {
				continue;
			};
			let name = name.trim();

			// The output-format section of the prompt also contains a
			// <keyword> example; real names are plain text.
			if name.is_empty() || name.contains('<') || name.contains('[') {
				continue;
			}

			entries.push_str(&format!(
				"<keyword><name>{name}</name><description>{name} description.</description></keyword>"
			));
		}

		format!("<output><keywords>{entries}</keywords>")
	}
}
impl CompletionProvider for StubCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		_opts: &'a CompletionOptions,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let prompt = messages
				.last()
				.and_then(|message| message.get("content"))
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_string();

			self.prompts.lock().unwrap_or_else(|err| err.into_inner()).push(prompt.clone());

			if prompt.contains("<locations_list>") {
				self.location_calls.fetch_add(1, Ordering::SeqCst);

				// The stop sequence would have eaten the closing tag.
				Ok(self.location.replace("</output>", ""))
			} else if prompt.contains("<keywords>") {
				self.keyword_calls.fetch_add(1, Ordering::SeqCst);

				if self.fail_keywords {
					return Err(color_eyre::eyre::eyre!("Keyword generation is down."));
				}

				Ok(Self::synthesize_keyword_output(&prompt))
			} else {
				self.breakdown_calls.fetch_add(1, Ordering::SeqCst);

				Ok(self.breakdown.clone())
			}
		})
	}
}

/// A completion provider that always fails.
pub struct FailingCompletion;
impl CompletionProvider for FailingCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_messages: &'a [Value],
		_opts: &'a CompletionOptions,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async { Err(color_eyre::eyre::eyre!("Completion provider is down.")) })
	}
}
