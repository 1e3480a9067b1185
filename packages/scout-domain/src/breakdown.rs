use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The structured output of the breakdown step. Every category's details
/// object is always present and well-typed even when its flag is 0, so
/// downstream consumers never branch on presence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryBreakdown {
	#[serde(default)]
	pub query_breakdown: BreakdownSummary,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response: Option<CategoryResponse>,
}
impl QueryBreakdown {
	/// The validly-shaped but empty breakdown used whenever the LLM output
	/// cannot be parsed.
	pub fn empty() -> Self {
		Self { query_breakdown: BreakdownSummary::default(), response: Some(CategoryResponse::default()) }
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BreakdownSummary {
	#[serde(default)]
	pub analysis: String,
	#[serde(default)]
	pub key_components: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryResponse {
	#[serde(deserialize_with = "de_flag")]
	pub region_based_query: u8,
	pub location_details: LocationDetails,
	#[serde(deserialize_with = "de_flag")]
	pub organisation_based_query: u8,
	pub organisation_details: OrganisationDetails,
	#[serde(deserialize_with = "de_flag")]
	pub sector_based_query: u8,
	pub sector_details: SectorDetails,
	#[serde(deserialize_with = "de_flag")]
	pub skill_based_query: u8,
	pub skill_details: SkillDetails,
	#[serde(deserialize_with = "de_flag")]
	pub db_based_query: u8,
	pub db_query_details: DbQueryDetails,
}
impl Default for CategoryResponse {
	fn default() -> Self {
		Self {
			region_based_query: 0,
			location_details: LocationDetails::default(),
			organisation_based_query: 0,
			organisation_details: OrganisationDetails::default(),
			sector_based_query: 0,
			sector_details: SectorDetails::default(),
			skill_based_query: 0,
			skill_details: SkillDetails::default(),
			db_based_query: 0,
			db_query_details: DbQueryDetails::default(),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationDetails {
	pub operator: Operator,
	pub locations: Vec<Location>,
}
impl Default for LocationDetails {
	fn default() -> Self {
		Self { operator: Operator::And, locations: Vec::new() }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganisationDetails {
	pub operator: Operator,
	pub organizations: Vec<Organisation>,
}
impl Default for OrganisationDetails {
	fn default() -> Self {
		Self { operator: Operator::And, organizations: Vec::new() }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorDetails {
	pub operator: Operator,
	pub sectors: Vec<Sector>,
}
impl Default for SectorDetails {
	fn default() -> Self {
		Self { operator: Operator::Or, sectors: Vec::new() }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillDetails {
	pub operator: Operator,
	pub skills: Vec<Skill>,
}
impl Default for SkillDetails {
	fn default() -> Self {
		Self { operator: Operator::And, skills: Vec::new() }
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DbQueryDetails {
	pub operator: Operator,
	pub queries: Vec<DbQuery>,
}
impl Default for DbQueryDetails {
	fn default() -> Self {
		Self { operator: Operator::And, queries: Vec::new() }
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Location {
	#[serde(default)]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub alt_names: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Organisation {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub temporal: Temporal,
	#[serde(default)]
	pub aliases: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Sector {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub temporal: Temporal,
	#[serde(default)]
	pub keywords: Vec<String>,
	#[serde(default, rename = "companyStage", skip_serializing_if = "Option::is_none")]
	pub company_stage: Option<CompanyStage>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompanyStage {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default, rename = "sizeRange")]
	pub size_range: SizeRange,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SizeRange {
	#[serde(default)]
	pub min: i64,
	#[serde(default)]
	pub max: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Skill {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub priority: Priority,
	#[serde(default)]
	pub temporal: Temporal,
	#[serde(default, rename = "relatedRoles")]
	pub related_roles: Vec<RelatedRole>,
	#[serde(default, rename = "titleKeywords", skip_serializing_if = "Option::is_none")]
	pub title_keywords: Option<Vec<String>>,
	#[serde(default, rename = "regexPatterns", skip_serializing_if = "Option::is_none")]
	pub regex_patterns: Option<RegexPatterns>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_key: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegexPatterns {
	#[serde(default)]
	pub keywords: Vec<String>,
	#[serde(default)]
	pub fields: Vec<String>,
}

/// A structured-field filter from the breakdown. Never entity-enriched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DbQuery {
	#[serde(default)]
	pub field: String,
	#[serde(default)]
	pub regex: String,
	#[serde(default)]
	pub description: String,
}

/// A related-role entry as the LLM emits it: a name-bearing record, a plain
/// string, or (rarely) some other shape coerced to its string form.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedRole {
	Named(NamedRole),
	Plain(String),
	Other(Value),
}
impl RelatedRole {
	pub fn canonical_name(&self) -> String {
		match self {
			Self::Named(role) => role.name.clone(),
			Self::Plain(name) => name.clone(),
			Self::Other(value) => match value.as_str() {
				Some(name) => name.to_string(),
				None => value.to_string(),
			},
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedRole {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
	And,
	Or,
}
impl<'de> Deserialize<'de> for Operator {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Ok(if raw.eq_ignore_ascii_case("or") { Self::Or } else { Self::And })
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporal {
	Current,
	Past,
	#[default]
	Any,
}
impl<'de> Deserialize<'de> for Temporal {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Ok(match raw.to_ascii_lowercase().as_str() {
			"current" => Self::Current,
			"past" => Self::Past,
			_ => Self::Any,
		})
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	#[default]
	Primary,
	Secondary,
	Tertiary,
}
impl<'de> Deserialize<'de> for Priority {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Ok(match raw.to_ascii_lowercase().as_str() {
			"secondary" => Self::Secondary,
			"tertiary" => Self::Tertiary,
			_ => Self::Primary,
		})
	}
}

/// Cached payload for one skill: the generated description plus, when some
/// other pipeline has stored them, pre-existing embeddings. This pipeline
/// forwards embeddings untouched and never synthesizes them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SkillCachePayload {
	#[serde(default)]
	pub description: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub embeddings: Option<Value>,
}

/// Aligns `dbQueryDetails` field names with the candidate schema: any
/// `education.*schoolName*` field is rewritten to use `school`.
pub fn normalize_db_query_fields(response: &mut CategoryResponse) {
	if response.db_based_query != 1 {
		return;
	}

	for query in &mut response.db_query_details.queries {
		if query.field.starts_with("education.") && query.field.contains("schoolName") {
			query.field = query.field.replace("schoolName", "school");
		}
	}
}

fn de_flag<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;

	Ok(match value {
		Value::Bool(true) => 1,
		Value::Number(number) if number.as_f64().unwrap_or(0.0) != 0.0 => 1,
		Value::String(raw) if raw.trim() == "1" || raw.eq_ignore_ascii_case("true") => 1,
		_ => 0,
	})
}
