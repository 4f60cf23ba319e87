use crate::models::{RecommendationRequest, UserPreferences};

pub const NOT_SPECIFIED: &str = "Not specified";

pub const SYSTEM_PROMPT: &str = "You are a professional fashion stylist and accessory expert. \
Provide detailed, personalized accessory recommendations based on the given context and user preferences. \
Respond strictly in valid JSON format with the following structure: \
{ summary: string, accessories: [{ type: string, name: string, description: string, priceRange: string, whereToBuy: string, stylingTips: string }], \
outfitSuggestions: [{ description: string }], colorPalette: string, occasionTips: string, weatherConsiderations: string }";

const OUTPUT_SCHEMA: &str = r#"{
  "summary": "string",
  "accessories": [
    {
      "type": "string",
      "name": "string",
      "description": "string",
      "priceRange": "string",
      "whereToBuy": "string",
      "stylingTips": "string"
    }
  ],
  "outfitSuggestions": [{ "description": "string" }],
  "colorPalette": "string",
  "occasionTips": "string",
  "weatherConsiderations": "string"
}"#;

/// Builds the user-turn instruction for an accessory recommendation.
///
/// Pure and infallible. Absent optional fields render as [`NOT_SPECIFIED`].
pub fn build(request: &RecommendationRequest, preferences: Option<&UserPreferences>) -> String {
    let outfit = request.current_outfit.as_ref().map(|o| o.summary());
    let prefs = preferences.cloned().unwrap_or_default();
    let budget_range = prefs.budget.and_then(|b| match (b.min, b.max) {
        (Some(min), Some(max)) => Some(format!("{min}-{max}")),
        (Some(min), None) => Some(format!("from {min}")),
        (None, Some(max)) => Some(format!("up to {max}")),
        (None, None) => None,
    });

    format!(
        "As a fashion expert, provide detailed accessory recommendations for:

Context:
- Occasion: {occasion}
- Weather: {weather}
- Style: {style}
- Color Preference: {color}
- Budget: {budget}
- Gender: {gender}
- Age: {age}
- Body Type: {body_type}
- Skin Tone: {skin_tone}
- Personal Style: {personal_style}
- Current Outfit: {outfit}

User Preferences:
- Favorite Colors: {favorite_colors}
- Style Preferences: {style_preferences}
- Budget Range: {budget_range}
- Favorite Brands: {favorite_brands}

Please provide:
1. A brief summary of the recommendation
2. 3-5 specific accessory recommendations with:
   - Type of accessory
   - Specific name/description
   - Price range
   - Where to buy
   - Styling tips
3. Outfit suggestions that complement the accessories
4. Color palette recommendations
5. Occasion-specific tips
6. Weather-appropriate considerations

Use exactly this JSON structure:
{schema}

Respond with JSON only, no extra text.",
        occasion = or_placeholder(Some(&request.occasion)),
        weather = or_placeholder(Some(&request.weather)),
        style = or_placeholder(request.style.as_ref()),
        color = or_placeholder(request.color.as_ref()),
        budget = or_placeholder(request.budget.as_ref()),
        gender = or_placeholder(request.gender.as_ref()),
        age = or_placeholder(request.age.as_ref()),
        body_type = or_placeholder(request.body_type.as_ref()),
        skin_tone = or_placeholder(request.skin_tone.as_ref()),
        personal_style = or_placeholder(request.personal_style.as_ref()),
        outfit = or_placeholder(outfit.as_ref()),
        favorite_colors = join_or_placeholder(&prefs.colors),
        style_preferences = or_placeholder(prefs.style.as_ref()),
        budget_range = or_placeholder(budget_range.as_ref()),
        favorite_brands = join_or_placeholder(&prefs.brands),
        schema = OUTPUT_SCHEMA,
    )
}

fn or_placeholder(value: Option<&String>) -> &str {
    value.map(|s| s.trim()).filter(|s| !s.is_empty()).unwrap_or(NOT_SPECIFIED)
}

fn join_or_placeholder(values: &[String]) -> String {
    if values.is_empty() { NOT_SPECIFIED.to_string() } else { values.join(", ") }
}
