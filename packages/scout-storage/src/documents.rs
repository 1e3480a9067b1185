use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::{
	Result,
	db::Db,
	error::Error,
	models::{self, SearchEvent, SearchStatus},
};

/// Search-document repository backed by a JSONB column, with the status
/// mirrored into its own column for cheap filtering.
pub struct PgSearchDocuments {
	pool: PgPool,
}
impl PgSearchDocuments {
	pub fn new(db: &Db) -> Self {
		Self { pool: db.pool.clone() }
	}

	pub async fn get(&self, search_id: &str) -> Result<Option<Value>> {
		let doc = sqlx::query_scalar::<_, Value>(
			"SELECT doc FROM search_documents WHERE search_id = $1",
		)
		.bind(search_id)
		.fetch_optional(&self.pool)
		.await?;

		Ok(doc)
	}

	pub async fn create(&self, doc: &Value) -> Result<()> {
		let search_id = doc
			.get("searchId")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::InvalidArgument("Document is missing a search id.".to_string()))?;
		let status = models::status_of(doc)?;
		let result = sqlx::query(
			"INSERT INTO search_documents (search_id, status, doc) VALUES ($1, $2, $3)",
		)
		.bind(search_id)
		.bind(status.as_str())
		.bind(doc)
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(err) if err.as_database_error().is_some_and(|e| e.is_unique_violation()) => {
				tracing::warn!(search_id, "Rejected duplicate search document.");

				Err(Error::Conflict(format!("Search document already exists: {search_id}.")))
			},
			Err(err) => Err(err.into()),
		}
	}

	/// Applies a guarded read-modify-write. The row is locked for the duration
	/// of the transaction; when `expected_statuses` is given and the current
	/// status is not among them, nothing is written and `Conflict` is returned.
	pub async fn update(
		&self,
		search_id: &str,
		set_fields: &Map<String, Value>,
		events: &[SearchEvent],
		expected_statuses: Option<&[SearchStatus]>,
	) -> Result<Value> {
		let mut tx = self.pool.begin().await?;
		let doc = sqlx::query_scalar::<_, Value>(
			"SELECT doc FROM search_documents WHERE search_id = $1 FOR UPDATE",
		)
		.bind(search_id)
		.fetch_optional(&mut *tx)
		.await?;
		let Some(mut doc) = doc else {
			return Err(Error::NotFound(format!("Search document not found: {search_id}.")));
		};

		if let Some(expected) = expected_statuses {
			let current = models::status_of(&doc)?;

			if !expected.contains(&current) {
				let expected =
					expected.iter().map(SearchStatus::as_str).collect::<Vec<_>>().join(", ");

				tracing::warn!(
					search_id,
					status = %current,
					expected,
					"Rejected guarded update on status mismatch.",
				);

				return Err(Error::Conflict(format!(
					"Search {search_id} has status {current}, expected one of [{expected}]."
				)));
			}
		}

		models::apply_set_fields(&mut doc, set_fields);
		models::append_events(&mut doc, events)?;

		let status = models::status_of(&doc)?;

		sqlx::query(
			"UPDATE search_documents SET status = $2, doc = $3, updated_at = now() WHERE search_id = $1",
		)
		.bind(search_id)
		.bind(status.as_str())
		.bind(&doc)
		.execute(&mut *tx)
		.await?;
		tx.commit().await?;

		Ok(doc)
	}
}
