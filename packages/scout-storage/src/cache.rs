use std::collections::HashMap;

use sqlx::PgPool;

use crate::{Result, db::Db};

/// Key-value cache for enrichment payloads. Values are stored as opaque
/// text; callers own the serialization.
pub struct PgEntityCache {
	pool: PgPool,
}
impl PgEntityCache {
	pub fn new(db: &Db) -> Self {
		Self { pool: db.pool.clone() }
	}

	pub async fn get(&self, key: &str) -> Result<Option<String>> {
		let payload = sqlx::query_scalar::<_, String>(
			"SELECT payload FROM entity_cache WHERE cache_key = $1",
		)
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		Ok(payload)
	}

	/// Fetches many keys in one round trip. The result has the same length
	/// and order as `keys`, with `None` for misses.
	pub async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}

		let rows = sqlx::query_as::<_, (String, String)>(
			"SELECT cache_key, payload FROM entity_cache WHERE cache_key = ANY($1)",
		)
		.bind(keys)
		.fetch_all(&self.pool)
		.await?;
		let found = rows.into_iter().collect::<HashMap<_, _>>();

		Ok(keys.iter().map(|key| found.get(key).cloned()).collect())
	}

	pub async fn set(&self, key: &str, payload: &str) -> Result<()> {
		sqlx::query(
			"\
INSERT INTO entity_cache (cache_key, payload, updated_at)
VALUES ($1, $2, now())
ON CONFLICT (cache_key) DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
		)
		.bind(key)
		.bind(payload)
		.execute(&self.pool)
		.await?;

		Ok(())
	}
}
