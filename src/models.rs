use serde::{Serialize, Deserialize};
use serde_with::{serde_as, skip_serializing_none, DefaultOnNull};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    /// Absent, `null` and blank all count as missing.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub weather: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub occasion: String,
    pub style: Option<String>,
    pub color: Option<String>,
    pub budget: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub body_type: Option<String>,
    pub skin_tone: Option<String>,
    pub personal_style: Option<String>,
    pub current_outfit: Option<OutfitDescription>,
    /// Free-text place name for the live weather lookup, e.g. "London,UK".
    pub location: Option<String>,
}

impl RecommendationRequest {
    #[cfg(test)]
    pub fn new(weather: impl Into<String>, occasion: impl Into<String>) -> Self {
        Self { weather: weather.into(), occasion: occasion.into(), ..Default::default() }
    }

    /// Names of the mandatory fields that are absent or blank.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.weather.trim().is_empty() { missing.push("weather"); }
        if self.occasion.trim().is_empty() { missing.push("occasion"); }
        missing
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct OutfitDescription {
    #[serde(default)]
    pub topwear: GarmentDescription,
    #[serde(default)]
    pub bottomwear: GarmentDescription,
    #[serde(default)]
    pub footwear: GarmentDescription,
}

impl OutfitDescription {
    /// Human-readable one-liner, e.g. `Shirt (white), Chinos (beige), Loafers (brown)`.
    pub fn summary(&self) -> String {
        format!(
            "{}, {}, {}",
            self.topwear.summary(),
            self.bottomwear.summary(),
            self.footwear.summary()
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GarmentDescription {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub color: String,
}

impl GarmentDescription {
    fn summary(&self) -> String { format!("{} ({})", self.kind, self.color) }
}

/// The normalized model reply. Every field is always populated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRecommendation {
    pub summary: String,
    pub accessories: Vec<Accessory>,
    pub outfit_suggestions: Vec<OutfitSuggestion>,
    pub color_palette: String,
    pub occasion_tips: String,
    pub weather_considerations: String,
    /// Top-level keys the model sent that fall outside the schema, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Accessory {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub price_range: String,
    pub where_to_buy: String,
    pub styling_tips: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutfitSuggestion {
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub condition: String,
    pub humidity: f64,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub weather: String,
    pub occasion: String,
    pub location: Option<String>,
    pub recommendation: StructuredRecommendation,
    pub feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub rating: u8,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct UserPreferences {
    pub style: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub brands: Vec<String>,
    pub budget: Option<BudgetRange>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct BudgetRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}
