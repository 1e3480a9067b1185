/// Canonicalizes an entity name into a stable cache-key fragment.
///
/// Lower-cases, replaces every character outside `[a-z0-9\s]` with a space,
/// collapses whitespace runs, and trims. Two surface variants of the same
/// entity ("NYC", "nyc!") must map to the same key.
pub fn normalize(text: &str) -> String {
	let mut out = String::with_capacity(text.len());

	for ch in text.to_lowercase().chars() {
		let mapped =
			if ch.is_ascii_lowercase() || ch.is_ascii_digit() { Some(ch) } else { None };

		match mapped {
			Some(ch) => out.push(ch),
			None =>
				if !out.is_empty() && !out.ends_with(' ') {
					out.push(' ');
				},
		}
	}

	if out.ends_with(' ') {
		out.pop();
	}

	out
}

pub fn location_alt_names_key(name: &str) -> String {
	format!("location_alt_names:{}", normalize(name))
}

pub fn skill_key(name: &str) -> String {
	format!("skill:{}", normalize(name))
}
