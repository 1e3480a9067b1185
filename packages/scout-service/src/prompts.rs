//! Prompt templates for the three completion calls the analyzer makes.
//!
//! Placeholders use `{{name}}` markers and are substituted with plain string
//! replacement. The structured-output prompts close with `</output>`, which
//! is also sent as a stop sequence; callers re-append it before parsing.

use serde_json::Value;

/// Stop sequences for the XML-shaped calls.
pub const STOP_OUTPUT: &[&str] = &["</output>"];

const BREAKDOWN_EXAMPLES: &str = r#"<examples>
<example>
<query>people graduated from college two years ago working in ml based out of blr and have been in startup</query>
<ideal_output>{
  "query_breakdown": {
    "key_components": [
      "graduated from college two years ago",
      "currently working in ML",
      "based out of Bangalore",
      "have startup experience"
    ],
    "analysis": "Query seeks individuals who graduated two years ago, are currently working in machine learning, are based in Bangalore, and have startup experience. 'Have been in startup' indicates accumulated experience (temporal: any)."
  },
  "response": {
    "regionBasedQuery": 1,
    "locationDetails": {
      "operator": "OR",
      "locations": [
        { "name": "Bangalore" },
        { "name": "Bengaluru" }
      ]
    },
    "sectorBasedQuery": 1,
    "sectorDetails": {
      "operator": "AND",
      "sectors": [
        {
          "name": "Startup",
          "temporal": "any",
          "keywords": ["startup", "start-up", "early stage", "seed stage", "series a", "venture backed", "founding", "stealth"],
          "companyStage": {
            "enabled": true,
            "sizeRange": { "min": 1, "max": 100 }
          }
        }
      ]
    },
    "organisationBasedQuery": 0,
    "organisationDetails": {
      "operator": "OR",
      "organizations": []
    },
    "skillBasedQuery": 1,
    "skillDetails": {
      "operator": "AND",
      "skills": [
        {
          "name": "Machine Learning",
          "priority": "primary",
          "temporal": "current",
          "relatedRoles": ["ML Engineer", "Data Scientist", "AI Engineer"],
          "titleKeywords": ["machine learning engineer", "ml engineer", "data scientist", "ml scientist"],
          "regexPatterns": {
            "keywords": ["machine learning", "\\bml\\b", "deep learning", "neural network", "pytorch", "tensorflow"],
            "fields": ["workExperience.title", "linkedinHeadline", "workExperience.description", "bio", "education.description"]
          }
        }
      ]
    },
    "dbBasedQuery": 1,
    "dbQueryDetails": {
      "operator": "AND",
      "queries": [
        {
          "field": "education.dates",
          "regex": ".*2023.*",
          "description": "Graduated two years ago"
        }
      ]
    }
  }
}</ideal_output>
</example>
<example>
<query>ex-SpaceX engineers currently at Tesla</query>
<ideal_output>{
  "query_breakdown": {
    "key_components": [
      "Former SpaceX employment",
      "Current Tesla employment",
      "Engineering role"
    ],
    "analysis": "Query seeks engineers who previously worked at SpaceX and are currently at Tesla. Clear temporal context for both organizations."
  },
  "response": {
    "regionBasedQuery": 0,
    "locationDetails": {
      "operator": "AND",
      "locations": []
    },
    "organisationBasedQuery": 1,
    "organisationDetails": {
      "operator": "AND",
      "organizations": [
        { "name": "SpaceX", "temporal": "past", "aliases": ["Space Exploration Technologies Corp"] },
        { "name": "Tesla", "temporal": "current", "aliases": ["Tesla, Inc.", "Tesla Motors"] }
      ]
    },
    "sectorBasedQuery": 0,
    "sectorDetails": {
      "operator": "OR",
      "sectors": []
    },
    "skillBasedQuery": 1,
    "skillDetails": {
      "operator": "AND",
      "skills": [
        {
          "name": "Engineering",
          "priority": "primary",
          "relatedRoles": ["Engineer", "Senior Engineer", "Staff Engineer"],
          "titleKeywords": ["engineer", "engineering", "technical lead"]
        }
      ]
    },
    "dbBasedQuery": 0,
    "dbQueryDetails": {
      "operator": "AND",
      "queries": []
    }
  }
}</ideal_output>
</example>
</examples>"#;

const BREAKDOWN_TEMPLATE: &str = r#"You are a query analyzer for talent search. Your task is to extract structured search criteria from natural language queries.

Today's date is {{current_date}}.

<query>{{query}}</query>

# DECISION FRAMEWORK

### dbBasedQuery (Structured Data Fields)
USE FOR: education dates, degrees, schools, field of study, certifications, spoken languages, graduation timing, student status.
DO NOT USE FOR: job titles or roles (use skillBasedQuery), work experience descriptions (use skillBasedQuery), company names (use organisationBasedQuery or sectorBasedQuery).

### skillBasedQuery (Skills and Roles)
USE FOR: job titles, technical skills, professional capabilities.
- For EXACT titles (C-level, specific positions) use titleKeywords.
- For FLEXIBLE role matching use regexPatterns and ALWAYS include "workExperience.title" and "linkedinHeadline" in fields.
- For SKILLS (not roles) use regexPatterns with description fields: "workExperience.description", "bio", "education.description".

### organisationBasedQuery (Specific Companies)
USE FOR: named companies and company groups (expand groups such as FAANG to individual companies with aliases).
DO NOT USE FOR: company types or industries (use sectorBasedQuery), educational institutions (use dbBasedQuery).

### sectorBasedQuery (Industries and Company Types)
USE FOR: industries, company stages, and combinations ("fintech startup" = TWO sectors with AND).
INCLUDE companyStage when the query mentions size or stage. Map stages to employee ranges: Seed 1-20, Series A 20-100, Series B 100-500, Startup 1-100, Enterprise 1000+.

### locationBasedQuery (Geographic Locations)
USE FOR: cities, regions, states. Expand regions to their cities (for example "Bay Area" to San Francisco, Oakland, San Jose, Palo Alto).

## Operator Selection
- AND: different domains required together, explicit "and" or "both".
- OR (default): listed alternatives, similar items, location expansions, company groups.

## Temporal Detection
- "current": "currently working", "working at", present tense without past indicators.
- "past": "previously", "former", "ex-", "used to".
- "any" (default): "have been", "have worked", accumulated experience, no temporal context.
Apply temporal at the INDIVIDUAL item level; each organization or sector can carry a different value.

# CRITICAL RULES
1. Role matching always goes through skillBasedQuery.
2. "have been" means temporal "any", not "past".
3. Related roles must be a SIMPLE STRING ARRAY, not objects.
4. Schools and degrees go in dbBasedQuery, never organisationBasedQuery.
5. Limit skills by priority: primary (direct), secondary (related), tertiary (rarely).

# OUTPUT TEMPLATE

{
  "query_breakdown": {
    "key_components": [],
    "analysis": ""
  },
  "response": {
    "regionBasedQuery": 0,
    "locationDetails": { "operator": "OR", "locations": [{"name": "City Name"}] },
    "sectorBasedQuery": 0,
    "sectorDetails": {
      "operator": "AND",
      "sectors": [{
        "name": "Sector Name",
        "temporal": "any",
        "keywords": ["keyword1", "keyword2"],
        "companyStage": { "enabled": true, "sizeRange": {"min": 20, "max": 100} }
      }]
    },
    "organisationBasedQuery": 0,
    "organisationDetails": {
      "operator": "OR",
      "organizations": [{ "name": "Company Name", "temporal": "any", "aliases": ["Alias1"] }]
    },
    "skillBasedQuery": 0,
    "skillDetails": {
      "operator": "AND",
      "skills": [{
        "name": "Skill Name",
        "priority": "primary",
        "temporal": "any",
        "relatedRoles": ["Role1", "Role2"],
        "titleKeywords": ["title1"],
        "regexPatterns": { "keywords": ["keyword1"], "fields": ["workExperience.description", "bio", "linkedinHeadline"] }
      }]
    },
    "dbBasedQuery": 0,
    "dbQueryDetails": {
      "operator": "AND",
      "queries": [{ "field": "", "regex": "", "description": "" }]
    }
  }
}

REMEMBER: Be concise, accurate, and consistent. Focus on extracting searchable criteria, not expanding unnecessarily, and make sure output is in json format."#;

const LOCATION_TEMPLATE: &str = r#"You are an AI assistant specialized in geographical names and variations. You will receive a list of locations and must generate common alternative names, abbreviations, or variations for each one to improve matching accuracy.

Here is the list of locations:
<locations_list>
{{locations}}
</locations_list>

Instructions:
1. For each location in the provided list, generate 2-4 alternative names.
2. Alternative names can include common abbreviations (e.g., NYC for New York City), nicknames, common misspellings, or older names still in use.
3. Provide the original name and a list of alternative names, formatted as an XML document.

Output Format:
<output>
  <location>
    <name>Original Location Name</name>
    <alt_names>
      <alt_name>Alternative Name 1</alt_name>
      <alt_name>Alternative Name 2</alt_name>
    </alt_names>
  </location>
</output>

Remember to focus on generating names useful for flexible matching. Begin your response directly with the <output> tag.
**IMPORTANT: Do not include any other text or tags in your response apart from the ones specified in the output format which is always enclosed in <output> tags. DON'T USE ```xml ``` tags in your response.**"#;

const KEYWORD_TEMPLATE: &str = r#"You are a technical writer specializing in standardized skill descriptions for vector-based matching systems. Generate descriptions for the following keywords:

<keywords>
{{keywords}}
</keywords>

For each keyword, create a 300-word standardized description covering: core definition, standard industry applications, common tools and methodologies, related skills, key responsibilities, industry-standard processes, and common challenges.

Guidelines:
- Use standardized industry terminology and widely-accepted practices.
- Avoid numerical metrics or specific project details.
- Maintain consistent structure across all descriptions.
- Use general terms that support vector matching.

Output format:
<output>
  <keywords>
    <keyword>
      <name>[keyword name]</name>
      <description>[standardized 300-word description]</description>
    </keyword>
  </keywords>
</output>

**IMPORTANT: Do not include any other text or tags in your response apart from the ones specified in the output format which is always enclosed in <output> tags. DON'T USE ```xml ``` tags in your response.**"#;

/// The breakdown call is two user messages: the worked examples, then the
/// framework with the query and date substituted.
pub fn breakdown_messages(query: &str, current_date: &str) -> Vec<Value> {
	let prompt = BREAKDOWN_TEMPLATE
		.replace("{{query}}", query)
		.replace("{{current_date}}", current_date);

	vec![user_message(BREAKDOWN_EXAMPLES), user_message(&prompt)]
}

pub fn location_messages(locations: &[String]) -> Vec<Value> {
	let prompt = LOCATION_TEMPLATE.replace("{{locations}}", &locations.join("\n"));

	vec![user_message(&prompt)]
}

pub fn keyword_messages(keywords: &[String]) -> Vec<Value> {
	let listed = keywords
		.iter()
		.map(|keyword| format!("<keyword>{keyword}</keyword>"))
		.collect::<Vec<_>>()
		.join("\n");
	let prompt = KEYWORD_TEMPLATE.replace("{{keywords}}", &listed);

	vec![user_message(&prompt)]
}

fn user_message(content: &str) -> Value {
	serde_json::json!({ "role": "user", "content": content })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn breakdown_messages_substitute_placeholders() {
		let messages = breakdown_messages("rust engineers in berlin", "2026-08-30");

		assert_eq!(messages.len(), 2);

		let prompt = messages[1]["content"].as_str().expect("prompt should be a string");
		assert!(prompt.contains("<query>rust engineers in berlin</query>"));
		assert!(prompt.contains("Today's date is 2026-08-30."));
		assert!(!prompt.contains("{{query}}"));
	}

	#[test]
	fn location_messages_list_one_location_per_line() {
		let locations = vec!["Berlin".to_string(), "Munich".to_string()];
		let messages = location_messages(&locations);

		let prompt = messages[0]["content"].as_str().expect("prompt should be a string");
		assert!(prompt.contains("Berlin\nMunich"));
	}

	#[test]
	fn keyword_messages_wrap_each_keyword() {
		let keywords = vec!["Rust".to_string(), "SQL".to_string()];
		let messages = keyword_messages(&keywords);

		let prompt = messages[0]["content"].as_str().expect("prompt should be a string");
		assert!(prompt.contains("<keyword>Rust</keyword>\n<keyword>SQL</keyword>"));
	}
}
