use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized declaration entry.
///
/// `id` stays stable across updates so reconciliation can tell "same entry,
/// new content" apart from "different entry".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationEntry {
	/// Identifier, unique within its scope after normalization.
	pub id: String,
	/// File name presented to the analysis engine.
	pub name: String,
	/// Raw declaration text.
	pub content: String,
	/// Disabled entries stay declared but are never registered.
	pub enabled: bool,
	/// Where the entry came from, informational only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin_path: Option<String>,
}

/// Caller-supplied entry before normalization.
///
/// Missing or blank ids and names are synthesized on ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDeclaration {
	pub id: Option<String>,
	pub name: Option<String>,
	pub content: String,
	pub enabled: bool,
	pub origin_path: Option<String>,
}

impl RawDeclaration {
	/// Creates an enabled entry with only content set.
	pub fn new(content: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			enabled: true,
			..Self::default()
		}
	}

	#[must_use]
	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	#[must_use]
	pub fn enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	#[must_use]
	pub fn origin_path(mut self, path: impl Into<String>) -> Self {
		self.origin_path = Some(path.into());
		self
	}

	/// Reads a loosely-typed persisted entry.
	///
	/// Returns `None` for anything that is not an object with string `content`.
	/// Non-string ids and names are treated as missing; `enabled` defaults to true.
	pub fn from_json(value: &Value) -> Option<Self> {
		let object = value.as_object()?;
		let content = object.get("content")?.as_str()?;
		let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
		Some(Self {
			id: text("id"),
			name: text("name"),
			content: content.to_owned(),
			enabled: object.get("enabled").and_then(Value::as_bool).unwrap_or(true),
			origin_path: text("originPath").or_else(|| text("origin_path")),
		})
	}

	/// Normalizes into a [`DeclarationEntry`] using `fallback_id` when no usable id was given.
	pub(crate) fn normalize(self, fallback_id: impl FnOnce() -> String) -> DeclarationEntry {
		let id = non_blank(self.id).unwrap_or_else(fallback_id);
		let name = non_blank(self.name).unwrap_or_else(|| id.clone());
		DeclarationEntry {
			id,
			name,
			content: self.content,
			enabled: self.enabled,
			origin_path: self.origin_path,
		}
	}
}

impl From<DeclarationEntry> for RawDeclaration {
	fn from(entry: DeclarationEntry) -> Self {
		Self {
			id: Some(entry.id),
			name: Some(entry.name),
			content: entry.content,
			enabled: entry.enabled,
			origin_path: entry.origin_path,
		}
	}
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn normalize_synthesizes_id_and_name() {
		let entry = RawDeclaration::new("declare const x: number;").id("  ").normalize(|| "manual-0".into());
		assert_eq!(entry.id, "manual-0");
		assert_eq!(entry.name, "manual-0");
		assert!(entry.enabled);
	}

	#[test]
	fn normalize_keeps_given_name() {
		let entry = RawDeclaration::new("").id("lodash").name("lodash.d.ts").normalize(|| unreachable!());
		assert_eq!(entry.name, "lodash.d.ts");
	}

	#[test]
	fn from_json_rejects_non_textual_content() {
		assert!(RawDeclaration::from_json(&json!({"id": "a", "content": 42})).is_none());
		assert!(RawDeclaration::from_json(&json!({"id": "a"})).is_none());
		assert!(RawDeclaration::from_json(&json!("declare const a: 1;")).is_none());
	}

	#[test]
	fn from_json_reads_optional_fields() {
		let raw = RawDeclaration::from_json(&json!({
			"id": 7,
			"name": "env.d.ts",
			"content": "declare const env: string;",
			"enabled": false,
			"originPath": "types/env.d.ts",
		}))
		.unwrap();
		assert_eq!(raw.id, None);
		assert_eq!(raw.name.as_deref(), Some("env.d.ts"));
		assert!(!raw.enabled);
		assert_eq!(raw.origin_path.as_deref(), Some("types/env.d.ts"));
	}
}
