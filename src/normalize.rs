//! Turns a chat model's free-text reply into a [`StructuredRecommendation`].
//!
//! Models are asked for bare JSON but routinely wrap it in prose, markdown
//! fences or a `### OUTPUT:` header, and some over-escape quotes. Extraction is
//! an ordered list of [`Extractor`]s; the first candidate that parses as a JSON
//! object wins and is then reshaped field by field against a table of
//! placeholder defaults, so the caller always gets a fully populated record or
//! an explicit error marker.
//!
//! The backslash repair is lossy on purpose: `{"summary": "a\nb"}` becomes
//! `anb`, and a legitimately escaped quote (`5'10\" jacket`) turns into an
//! unterminated string and fails to parse. It is on by default because spurious
//! escaping is far more common in practice than meaningful escapes.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{Accessory, OutfitSuggestion, StructuredRecommendation};

pub const MALFORMED_MESSAGE: &str = "Invalid AI response format";
pub const OUTPUT_MARKER: &str = "### OUTPUT:";

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json([\s\S]*?)```").expect("fenced json pattern"));
static FIRST_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*?\}").expect("object pattern"));

/// Either a complete record or the `{ "error": ... }` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedOutcome {
    Recommendation(StructuredRecommendation),
    Malformed(MalformedOutput),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedOutput {
    pub error: String,
}

impl NormalizedOutcome {
    pub fn malformed() -> Self {
        Self::Malformed(MalformedOutput { error: MALFORMED_MESSAGE.to_string() })
    }

    pub fn into_recommendation(self) -> Option<StructuredRecommendation> {
        match self {
            Self::Recommendation(r) => Some(r),
            Self::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool { matches!(self, Self::Malformed(_)) }
}

/// Cleanup applied to a candidate right before it is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repair {
    None,
    #[default]
    StripBackslashes,
}

impl Repair {
    pub fn apply<'a>(&self, candidate: &'a str) -> Cow<'a, str> {
        match self {
            Repair::StripBackslashes if candidate.contains('\\') => Cow::Owned(candidate.replace('\\', "")),
            _ => Cow::Borrowed(candidate),
        }
    }

    /// Parses the repaired candidate, accepting only JSON objects.
    pub fn parse_object(&self, candidate: &str) -> Result<Map<String, Value>, String> {
        match serde_json::from_str::<Value>(&self.apply(candidate)) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("expected a JSON object, found {}", json_kind(&other))),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// One way of locating candidate JSON in raw model text.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;
    /// Returns the candidate string, or `None` when this strategy does not apply.
    fn extract(&self, text: &str, repair: Repair) -> Option<String>;
}

/// Content strictly between a ```` ```json ```` fence and the next ```` ``` ````.
pub struct FencedJson;

impl Extractor for FencedJson {
    fn name(&self) -> &'static str { "fenced-json" }

    fn extract(&self, text: &str, _repair: Repair) -> Option<String> {
        FENCED_JSON.captures(text).map(|c| c[1].trim().to_string())
    }
}

/// Everything after a literal marker, then narrowed with [`FirstObject`].
pub struct OutputMarker(pub &'static str);

impl Extractor for OutputMarker {
    fn name(&self) -> &'static str { "output-marker" }

    fn extract(&self, text: &str, repair: Repair) -> Option<String> {
        let (_, region) = text.split_once(self.0)?;
        FirstObject.extract(region, repair)
    }
}

/// The shortest `{ ... }` span starting at the first `{` that parses.
pub struct FirstObject;

impl Extractor for FirstObject {
    fn name(&self) -> &'static str { "first-object" }

    fn extract(&self, text: &str, repair: Repair) -> Option<String> {
        let lazy = FIRST_OBJECT.find(text)?;
        let start = lazy.start();
        let parses = |end: usize| repair.parse_object(&text[start..end]).is_ok();

        if parses(lazy.end()) {
            return Some(lazy.as_str().to_string());
        }
        text[lazy.end()..]
            .match_indices('}')
            .map(|(offset, _)| lazy.end() + offset + 1)
            .find(|&end| parses(end))
            .map(|end| text[start..end].to_string())
            .or_else(|| Some(lazy.as_str().to_string()))
    }
}

pub struct ResponseNormalizer {
    extractors: Vec<Box<dyn Extractor>>,
    repair: Repair,
}

impl Default for ResponseNormalizer {
    fn default() -> Self { Self::new(Repair::default()) }
}

impl ResponseNormalizer {
    pub fn new(repair: Repair) -> Self {
        Self::with_extractors(
            vec![Box::new(FencedJson), Box::new(OutputMarker(OUTPUT_MARKER)), Box::new(FirstObject)],
            repair,
        )
    }

    pub fn with_extractors(extractors: Vec<Box<dyn Extractor>>, repair: Repair) -> Self {
        Self { extractors, repair }
    }

    /// Never fails: returns [`NormalizedOutcome::Malformed`] when nothing parses.
    pub fn normalize(&self, raw: &str) -> NormalizedOutcome {
        match self.extract_object(raw) {
            Ok((strategy, parsed)) => {
                debug!(strategy, "parsed model output");
                NormalizedOutcome::Recommendation(reshape(&parsed))
            }
            Err(reasons) => {
                warn!(
                    raw = %preview(raw, 500),
                    reasons = %reasons.join("; "),
                    "🚨 could not extract JSON from model output"
                );
                NormalizedOutcome::malformed()
            }
        }
    }

    fn extract_object(&self, raw: &str) -> Result<(&'static str, Map<String, Value>), Vec<String>> {
        let mut reasons = Vec::new();
        for extractor in &self.extractors {
            let Some(candidate) = extractor.extract(raw, self.repair) else {
                continue;
            };
            match self.repair.parse_object(&candidate) {
                Ok(map) => return Ok((extractor.name(), map)),
                Err(e) => reasons.push(format!("{}: {}", extractor.name(), e)),
            }
        }
        if reasons.is_empty() {
            reasons.push("no JSON candidate found".to_string());
        }
        Err(reasons)
    }
}

/// A schema key and the placeholder used when it is absent, empty or not a string.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static str,
    pub default: &'static str,
}

impl Field {
    const fn new(key: &'static str, default: &'static str) -> Self { Self { key, default } }

    pub fn read(&self, obj: Option<&Map<String, Value>>) -> String {
        obj.and_then(|o| o.get(self.key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default)
            .to_string()
    }
}

pub const SUMMARY: Field = Field::new("summary", "No summary available");
pub const COLOR_PALETTE: Field = Field::new("colorPalette", "No color palette available");
pub const OCCASION_TIPS: Field = Field::new("occasionTips", "No occasion tips available");
pub const WEATHER_CONSIDERATIONS: Field =
    Field::new("weatherConsiderations", "No weather considerations available");
pub const ACCESSORIES_KEY: &str = "accessories";
pub const OUTFIT_SUGGESTIONS_KEY: &str = "outfitSuggestions";

pub const ACCESSORY_TYPE: Field = Field::new("type", "Unknown type");
pub const ACCESSORY_NAME: Field = Field::new("name", "Unnamed accessory");
pub const ACCESSORY_DESCRIPTION: Field = Field::new("description", "No description available");
pub const ACCESSORY_PRICE_RANGE: Field = Field::new("priceRange", "Price not specified");
pub const ACCESSORY_WHERE_TO_BUY: Field = Field::new("whereToBuy", "Not specified");
pub const ACCESSORY_STYLING_TIPS: Field = Field::new("stylingTips", "No styling tips available");

pub const SUGGESTION_DESCRIPTION: Field = Field::new("description", "No description available");

const TOP_LEVEL_KEYS: [&str; 6] = [
    SUMMARY.key,
    ACCESSORIES_KEY,
    OUTFIT_SUGGESTIONS_KEY,
    COLOR_PALETTE.key,
    OCCASION_TIPS.key,
    WEATHER_CONSIDERATIONS.key,
];

/// Maps an arbitrarily shaped object onto the full schema.
pub fn reshape(parsed: &Map<String, Value>) -> StructuredRecommendation {
    let obj = Some(parsed);
    let accessories = elements(parsed, ACCESSORIES_KEY)
        .map(|item| {
            let item = item.as_object();
            Accessory {
                kind: ACCESSORY_TYPE.read(item),
                name: ACCESSORY_NAME.read(item),
                description: ACCESSORY_DESCRIPTION.read(item),
                price_range: ACCESSORY_PRICE_RANGE.read(item),
                where_to_buy: ACCESSORY_WHERE_TO_BUY.read(item),
                styling_tips: ACCESSORY_STYLING_TIPS.read(item),
            }
        })
        .collect();
    let outfit_suggestions = elements(parsed, OUTFIT_SUGGESTIONS_KEY)
        .map(|item| OutfitSuggestion { description: SUGGESTION_DESCRIPTION.read(item.as_object()) })
        .collect();
    let extra = parsed
        .iter()
        .filter(|(k, _)| !TOP_LEVEL_KEYS.contains(&k.as_str()) && k.as_str() != "error")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    StructuredRecommendation {
        summary: SUMMARY.read(obj),
        accessories,
        outfit_suggestions,
        color_palette: COLOR_PALETTE.read(obj),
        occasion_tips: OCCASION_TIPS.read(obj),
        weather_considerations: WEATHER_CONSIDERATIONS.read(obj),
        extra,
    }
}

fn elements<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(key).and_then(Value::as_array).into_iter().flatten()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preview(s: &str, max: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max) {
        Some((idx, _)) => Cow::Owned(format!("{}...[{} chars]", &s[..idx], s.chars().count())),
        None => Cow::Borrowed(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn normalize(raw: &str) -> NormalizedOutcome { ResponseNormalizer::default().normalize(raw) }

    fn record(raw: &str) -> StructuredRecommendation {
        normalize(raw).into_recommendation().expect("expected a full record")
    }

    #[test]
    fn recovers_fields_from_bare_json() {
        let rec = record(r#"{"summary":"Layer up","colorPalette":"Navy and grey"}"#);
        assert_eq!(rec.summary, "Layer up");
        assert_eq!(rec.color_palette, "Navy and grey");
        assert_eq!(rec.occasion_tips, OCCASION_TIPS.default);
    }

    #[test]
    fn recovers_json_surrounded_by_prose() {
        let rec = record("Sure! Here is my advice: {\"summary\":\"Go classic\"} Let me know.");
        assert_eq!(rec.summary, "Go classic");
    }

    #[test]
    fn fenced_block_with_prose_keeps_other_fields_at_defaults() {
        let rec = record("Here you go:\n```json\n{\"topwear\":\"Blazer\"}\n```");
        assert_eq!(rec.extra.get("topwear"), Some(&json!("Blazer")));
        assert_eq!(rec.summary, SUMMARY.default);
        assert!(rec.accessories.is_empty());
        assert!(rec.outfit_suggestions.is_empty());
        assert_eq!(rec.color_palette, COLOR_PALETTE.default);
        assert_eq!(rec.occasion_tips, OCCASION_TIPS.default);
        assert_eq!(rec.weather_considerations, WEATHER_CONSIDERATIONS.default);
    }

    #[test]
    fn nested_objects_are_recovered_whole() {
        let raw = r#"Result:
{"summary":"Smart casual","accessories":[{"type":"Watch","name":"Field watch"},{"type":"Belt"}],
 "outfitSuggestions":[{"description":"Chinos with a knit polo"}],"colorPalette":"Earth tones"}
Enjoy!"#;
        let rec = record(raw);
        assert_eq!(rec.accessories.len(), 2);
        assert_eq!(rec.accessories[0].name, "Field watch");
        assert_eq!(rec.accessories[1].kind, "Belt");
        assert_eq!(rec.accessories[1].name, ACCESSORY_NAME.default);
        assert_eq!(rec.outfit_suggestions[0].description, "Chinos with a knit polo");
        assert_eq!(rec.color_palette, "Earth tones");
    }

    #[test]
    fn marker_narrows_the_search_region() {
        let raw = "Example format: {\"summary\": \"[text]\" ...\n### OUTPUT:\n{\"summary\":\"Real answer\"}";
        assert_eq!(record(raw).summary, "Real answer");
    }

    #[test]
    fn unparseable_fence_falls_through_to_later_strategies() {
        let raw = "```json\nnot json at all\n``` but later {\"summary\":\"Fallback\"}";
        assert_eq!(record(raw).summary, "Fallback");
    }

    #[test]
    fn text_without_braces_yields_error_marker() {
        let outcome = normalize("I am sorry, I cannot help with fashion today.");
        assert_eq!(outcome, NormalizedOutcome::malformed());
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({ "error": MALFORMED_MESSAGE }));
    }

    #[test]
    fn truncated_json_yields_error_marker() {
        assert!(normalize(r#"{"summary": "Nice""#).is_malformed());
        assert!(normalize("").is_malformed());
    }

    #[test]
    fn every_accessory_field_defaults_independently() {
        let rec = record(r#"{"accessories":[{"name":"Silk scarf","priceRange":42}, "umbrella", null]}"#);
        assert_eq!(rec.accessories.len(), 3);
        let scarf = &rec.accessories[0];
        assert_eq!(scarf.name, "Silk scarf");
        assert_eq!(scarf.kind, ACCESSORY_TYPE.default);
        assert_eq!(scarf.description, ACCESSORY_DESCRIPTION.default);
        assert_eq!(scarf.price_range, ACCESSORY_PRICE_RANGE.default);
        assert_eq!(scarf.where_to_buy, ACCESSORY_WHERE_TO_BUY.default);
        assert_eq!(scarf.styling_tips, ACCESSORY_STYLING_TIPS.default);
        for bare in &rec.accessories[1..] {
            assert_eq!(bare.kind, ACCESSORY_TYPE.default);
            assert_eq!(bare.name, ACCESSORY_NAME.default);
        }
    }

    #[test]
    fn wrong_types_and_empty_strings_fall_back_to_placeholders() {
        let rec = record(
            r#"{"summary":"","colorPalette":["red"],"occasionTips":7,"accessories":"a hat","outfitSuggestions":{"description":"x"}}"#,
        );
        assert_eq!(rec.summary, SUMMARY.default);
        assert_eq!(rec.color_palette, COLOR_PALETTE.default);
        assert_eq!(rec.occasion_tips, OCCASION_TIPS.default);
        assert!(rec.accessories.is_empty());
        assert!(rec.outfit_suggestions.is_empty());
    }

    #[test]
    fn serialized_record_has_every_schema_field() {
        let value = serde_json::to_value(record("{}")).unwrap();
        for key in TOP_LEVEL_KEYS {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["accessories"], json!([]));
    }

    #[test]
    fn reserved_error_key_is_not_carried_through() {
        let rec = record(r#"{"error":"model refused","summary":"ok"}"#);
        assert!(rec.extra.get("error").is_none());
        assert_eq!(rec.summary, "ok");
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = "noise {\"summary\":\"same\",\"accessories\":[{}]} noise";
        assert_eq!(normalize(raw), normalize(raw));
    }

    #[test]
    fn backslash_repair_is_lossy() {
        // The escaped newline and quote are part of the intended content, and
        // stripping destroys both. This is the accepted cost of the repair.
        let newline = r#"{"summary": "line\nbreak"}"#;
        assert_eq!(record(newline).summary, "linenbreak");

        let escaped_quote = r#"{"summary": "5\'10\" jacket"}"#;
        assert_eq!(Repair::StripBackslashes.apply(escaped_quote), r#"{"summary": "5'10" jacket"}"#);
        assert!(normalize(escaped_quote).is_malformed());
    }

    #[test]
    fn over_escaped_quotes_are_repaired() {
        let raw = r#"{\"summary\": \"Wear a trench coat\"}"#;
        assert_eq!(record(raw).summary, "Wear a trench coat");
        assert!(ResponseNormalizer::new(Repair::None).normalize(raw).is_malformed());
    }

    #[test]
    fn without_repair_valid_escapes_survive() {
        let normalizer = ResponseNormalizer::new(Repair::None);
        let rec = normalizer.normalize(r#"{"summary": "line\nbreak"}"#).into_recommendation().unwrap();
        assert_eq!(rec.summary, "line\nbreak");
    }

    #[test]
    fn extractors_can_be_reordered() {
        let raw = "{\"summary\":\"bare\"}\n```json\n{\"summary\":\"fenced\"}\n```";
        assert_eq!(record(raw).summary, "fenced");

        let brace_first = ResponseNormalizer::with_extractors(
            vec![Box::new(FirstObject), Box::new(FencedJson)],
            Repair::default(),
        );
        let rec = brace_first.normalize(raw).into_recommendation().unwrap();
        assert_eq!(rec.summary, "bare");
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        assert_eq!(preview(&text, 4), "éééé...[10 chars]");
        assert_eq!(preview("short", 10), "short");
    }

    #[test]
    fn first_object_prefers_shortest_parseable_span() {
        let text = r#"{"a":{"b":1}} trailing {"c":2}"#;
        assert_eq!(FirstObject.extract(text, Repair::None).as_deref(), Some(r#"{"a":{"b":1}}"#));
        assert_eq!(FirstObject.extract("no braces", Repair::None), None);
        assert_eq!(FencedJson.extract("```\n{}\n```", Repair::None), None);
    }
}
