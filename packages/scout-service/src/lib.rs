pub mod analyzer;
pub mod pipeline;
pub mod prompts;
pub mod resolver;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};

pub use analyzer::AnalysisOptions;
pub use pipeline::{PipelineRequest, PipelineResponse};
use scout_config::{Config, LlmProviderConfig};
use scout_providers::CompletionOptions;
use scout_storage::{
	cache::PgEntityCache,
	db::Db,
	documents::PgSearchDocuments,
	models::{SearchEvent, SearchStatus},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		opts: &'a CompletionOptions,
	) -> BoxFuture<'a, color_eyre::Result<String>>;
}

pub trait SearchDocumentStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, search_id: &'a str)
	-> BoxFuture<'a, scout_storage::Result<Option<Value>>>;

	fn create<'a>(&'a self, doc: &'a Value) -> BoxFuture<'a, scout_storage::Result<()>>;

	fn update<'a>(
		&'a self,
		search_id: &'a str,
		set_fields: &'a Map<String, Value>,
		events: &'a [SearchEvent],
		expected_statuses: Option<&'a [SearchStatus]>,
	) -> BoxFuture<'a, scout_storage::Result<Value>>;
}

pub trait EntityCache
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, scout_storage::Result<Option<String>>>;

	fn multi_get<'a>(
		&'a self,
		keys: &'a [String],
	) -> BoxFuture<'a, scout_storage::Result<Vec<Option<String>>>>;

	fn set<'a>(&'a self, key: &'a str, payload: &'a str)
	-> BoxFuture<'a, scout_storage::Result<()>>;
}

pub struct ScoutService {
	pub cfg: Config,
	pub store: Arc<dyn SearchDocumentStore>,
	pub cache: Arc<dyn EntityCache>,
	pub completion: Arc<dyn CompletionProvider>,
}
impl ScoutService {
	pub fn new(cfg: Config, db: &Db) -> Self {
		Self {
			cfg,
			store: Arc::new(PgSearchDocuments::new(db)),
			cache: Arc::new(PgEntityCache::new(db)),
			completion: Arc::new(DefaultCompletion),
		}
	}

	pub fn with_parts(
		cfg: Config,
		store: Arc<dyn SearchDocumentStore>,
		cache: Arc<dyn EntityCache>,
		completion: Arc<dyn CompletionProvider>,
	) -> Self {
		Self { cfg, store, cache, completion }
	}
}

struct DefaultCompletion;

impl CompletionProvider for DefaultCompletion {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
		opts: &'a CompletionOptions,
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(scout_providers::complete(cfg, messages, opts))
	}
}

impl SearchDocumentStore for PgSearchDocuments {
	fn get<'a>(
		&'a self,
		search_id: &'a str,
	) -> BoxFuture<'a, scout_storage::Result<Option<Value>>> {
		Box::pin(self.get(search_id))
	}

	fn create<'a>(&'a self, doc: &'a Value) -> BoxFuture<'a, scout_storage::Result<()>> {
		Box::pin(self.create(doc))
	}

	fn update<'a>(
		&'a self,
		search_id: &'a str,
		set_fields: &'a Map<String, Value>,
		events: &'a [SearchEvent],
		expected_statuses: Option<&'a [SearchStatus]>,
	) -> BoxFuture<'a, scout_storage::Result<Value>> {
		Box::pin(self.update(search_id, set_fields, events, expected_statuses))
	}
}

impl EntityCache for PgEntityCache {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, scout_storage::Result<Option<String>>> {
		Box::pin(self.get(key))
	}

	fn multi_get<'a>(
		&'a self,
		keys: &'a [String],
	) -> BoxFuture<'a, scout_storage::Result<Vec<Option<String>>>> {
		Box::pin(self.multi_get(keys))
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		payload: &'a str,
	) -> BoxFuture<'a, scout_storage::Result<()>> {
		Box::pin(self.set(key, payload))
	}
}
