//! Typed boundary for seed and LLM term payloads.
//!
//! Both inputs arrive as loosely shaped JSON. Everything is validated and
//! coerced here so the miner and the consolidator only ever see `SeedTerm`
//! and `LlmTerm`. Malformed input degrades to "no contribution", never to an
//! error.
//!
//! | Input | Accepted shapes |
//! |-------|-----------------|
//! | seeds | `[{term, frequency, contexts}]` |
//! | LLM   | `[{canonical, …}]` or `{"terms": [{canonical, …}]}` |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Default LLM priority when the model omits one.
pub const DEFAULT_LLM_PRIORITY: f64 = 0.5;

/// A deterministically mined candidate term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedTerm {
    pub term: String,
    /// Accumulated section weight of every occurrence.
    pub frequency: f64,
    /// Up to three short snippets around the term.
    #[serde(default)]
    pub contexts: Vec<String>,
}

impl SeedTerm {
    /// Coerce one seed object. Returns `None` for non-objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            term: obj.get("term").map(value_to_string).unwrap_or_default(),
            frequency: obj.get("frequency").and_then(value_to_f64).unwrap_or(1.0),
            contexts: string_list(obj.get("contexts")),
        })
    }
}

/// One entity extracted by the LLM collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmTerm {
    pub canonical: String,
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// The model's own claim; verified separately against the deck text.
    #[serde(default)]
    pub present_in_deck: bool,
}

fn default_priority() -> f64 {
    DEFAULT_LLM_PRIORITY
}

impl LlmTerm {
    /// Coerce one term object. Returns `None` for non-objects.
    ///
    /// Non-string variants/classes are dropped, numeric strings are accepted
    /// as priorities, and priorities are clamped into `[0, 1]`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let priority = obj
            .get("priority")
            .and_then(value_to_f64)
            .filter(|p| p.is_finite())
            .unwrap_or(DEFAULT_LLM_PRIORITY)
            .clamp(0.0, 1.0);
        Some(Self {
            canonical: obj.get("canonical").map(value_to_string).unwrap_or_default(),
            variants: string_list(obj.get("variants")),
            classes: string_list(obj.get("classes")),
            priority,
            present_in_deck: obj.get("present_in_deck").map(value_to_bool).unwrap_or(false),
        })
    }
}

/// Extract the LLM term list from a raw payload.
///
/// `None`, non-list/non-`{"terms": [...]}` shapes, and non-object entries all
/// contribute nothing.
pub fn parse_llm_terms(payload: Option<&Value>) -> Vec<LlmTerm> {
    let items = match payload {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(Value::Object(obj)) => match obj.get("terms") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!("LLM payload object has no \"terms\" array; treating as empty");
                return Vec::new();
            }
        },
        Some(_) => {
            warn!("LLM payload is neither a list nor an object; treating as empty");
            return Vec::new();
        }
    };
    let terms: Vec<LlmTerm> = items.iter().filter_map(LlmTerm::from_value).collect();
    if terms.len() < items.len() {
        warn!(
            skipped = items.len() - terms.len(),
            "non-object entries skipped in LLM payload"
        );
    }
    terms
}

/// Extract the seed list from a raw payload. Anything but a list is empty.
pub fn parse_seeds(payload: Option<&Value>) -> Vec<SeedTerm> {
    match payload {
        Some(Value::Array(items)) => items.iter().filter_map(SeedTerm::from_value).collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            warn!("seed payload is not a list; treating as empty");
            Vec::new()
        }
    }
}

/// Strip Markdown code fences and any prose preceding the first JSON
/// array or object.
pub fn sanitize_json_text(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    if text.starts_with("```") {
        let mut lines: Vec<&str> = text.lines().skip(1).collect();
        while lines.last().is_some_and(|l| l.trim() == "```") {
            lines.pop();
        }
        text = lines.join("\n").trim().to_string();
    }
    match text.find(|c: char| c == '[' || c == '{') {
        Some(idx) => text[idx..].to_string(),
        None => text,
    }
}

/// Parse possibly noisy model output into JSON.
///
/// Falls back to the first complete JSON value when trailing text follows
/// it. Returns `None` when nothing parses.
pub fn parse_json_lenient(raw: &str) -> Option<Value> {
    let text = sanitize_json_text(raw);
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Some(value),
        Err(_) => {
            let mut stream = serde_json::Deserializer::from_str(&text).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => Some(value),
                _ => {
                    warn!("payload is not valid JSON; treating as empty");
                    None
                }
            }
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn llm_payload_accepts_list_or_terms_object() {
        let list = json!([{ "canonical": "Dyson Sphere" }]);
        let wrapped = json!({ "terms": [{ "canonical": "Dyson Sphere" }] });
        assert_eq!(parse_llm_terms(Some(&list)).len(), 1);
        assert_eq!(parse_llm_terms(Some(&wrapped)).len(), 1);
    }

    #[test]
    fn malformed_llm_payload_is_empty() {
        assert!(parse_llm_terms(None).is_empty());
        assert!(parse_llm_terms(Some(&json!("terms"))).is_empty());
        assert!(parse_llm_terms(Some(&json!({ "terms": "nope" }))).is_empty());
        assert!(parse_llm_terms(Some(&json!({ "items": [] }))).is_empty());
    }

    #[test]
    fn llm_term_fields_are_coerced() {
        let term = LlmTerm::from_value(&json!({
            "canonical": "Liam Nguyen",
            "variants": ["Liam", 7, null, "L. Nguyen"],
            "classes": ["PERSON", {"x": 1}],
            "priority": "0.8",
            "present_in_deck": true
        }))
        .unwrap();
        assert_eq!(term.variants, vec!["Liam", "L. Nguyen"]);
        assert_eq!(term.classes, vec!["PERSON"]);
        assert!((term.priority - 0.8).abs() < 1e-12);
        assert!(term.present_in_deck);
    }

    #[test]
    fn llm_term_defaults_and_clamping() {
        let term = LlmTerm::from_value(&json!({ "canonical": 42, "priority": 3.5 })).unwrap();
        assert_eq!(term.canonical, "42");
        assert!((term.priority - 1.0).abs() < f64::EPSILON);
        assert!(!term.present_in_deck);

        let missing = LlmTerm::from_value(&json!({})).unwrap();
        assert_eq!(missing.canonical, "");
        assert!((missing.priority - DEFAULT_LLM_PRIORITY).abs() < f64::EPSILON);
        assert!(LlmTerm::from_value(&json!("Dyson")).is_none());
    }

    #[test]
    fn seeds_default_frequency_to_one() {
        let seeds = parse_seeds(Some(&json!([{ "term": "Acme" }, 5, { "term": "Beta", "frequency": 2.5 }])));
        assert_eq!(seeds.len(), 2);
        assert!((seeds[0].frequency - 1.0).abs() < f64::EPSILON);
        assert!((seeds[1].frequency - 2.5).abs() < f64::EPSILON);
        assert!(parse_seeds(Some(&json!({ "term": "x" }))).is_empty());
    }

    #[test]
    fn sanitize_strips_fences_and_prose() {
        let raw = "```json\n{\"terms\": []}\n```";
        assert_eq!(sanitize_json_text(raw), "{\"terms\": []}");
        let prose = "Here are the entities:\n[{\"canonical\": \"Acme\"}]";
        assert_eq!(sanitize_json_text(prose), "[{\"canonical\": \"Acme\"}]");
    }

    #[test]
    fn lenient_parse_takes_first_value() {
        let value = parse_json_lenient("[1, 2]\nthat's all!").unwrap();
        assert_eq!(value, json!([1, 2]));
        assert!(parse_json_lenient("no json here").is_none());
        assert!(parse_json_lenient("   ").is_none());
    }
}
