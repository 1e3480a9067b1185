pub mod breakdown;
pub mod normalize;
pub mod structured;

pub use breakdown::{
	BreakdownSummary, CategoryResponse, CompanyStage, DbQuery, DbQueryDetails, Location,
	LocationDetails, NamedRole, Operator, Organisation, OrganisationDetails, Priority,
	QueryBreakdown, RegexPatterns, RelatedRole, Sector, SectorDetails, SizeRange, Skill,
	SkillCachePayload, SkillDetails, Temporal, normalize_db_query_fields,
};
pub use normalize::{location_alt_names_key, normalize, skill_key};
pub use structured::{
	LocationAltNames, ParseOutcome, parse_breakdown, parse_keyword_output, parse_location_output,
	strip_fences,
};
