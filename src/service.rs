use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    llm::{CallOptions, CompletionProvider, LlmError},
    models::{RecommendationRequest, UserPreferences, WeatherSnapshot},
    normalize::{NormalizedOutcome, ResponseNormalizer},
    prompt,
    weather::WeatherLookup,
};

/// Result of one recommendation round trip.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub outcome: NormalizedOutcome,
    /// `None` when no location was given, lookups are disabled, or the lookup failed.
    pub weather: Option<WeatherSnapshot>,
}

/// PromptBuilder -> ModelClient -> ResponseNormalizer, with an optional
/// weather lookup alongside the model call.
pub struct RecommendationService {
    provider: Arc<dyn CompletionProvider>,
    weather: Option<Arc<dyn WeatherLookup>>,
    normalizer: ResponseNormalizer,
    options: CallOptions,
}

impl RecommendationService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        weather: Option<Arc<dyn WeatherLookup>>,
        normalizer: ResponseNormalizer,
        options: CallOptions,
    ) -> Self {
        Self { provider, weather, normalizer, options }
    }

    pub fn model(&self) -> &str { &self.options.model }

    pub async fn get_recommendation(
        &self,
        request: &RecommendationRequest,
        preferences: Option<&UserPreferences>,
    ) -> Result<Recommendation, LlmError> {
        let prompt = prompt::build(request, preferences);
        info!("🎯 Recommending for occasion '{}' in '{}' weather", request.occasion, request.weather);

        let (raw, weather) = tokio::join!(
            self.provider.complete(&prompt, &self.options),
            self.lookup_weather(request.location.as_deref())
        );
        let raw = raw?;

        let outcome = self.normalizer.normalize(&raw);
        if outcome.is_malformed() {
            warn!("⚠️ Model reply for '{}' could not be normalized", request.occasion);
        } else {
            info!("✅ Recommendation ready for '{}'", request.occasion);
        }
        Ok(Recommendation { outcome, weather })
    }

    /// Free-form chat message; the reply goes through the same normalizer.
    pub async fn chat(&self, message: &str) -> Result<NormalizedOutcome, LlmError> {
        info!("💬 Chat message ({} chars)", message.len());
        let raw = self.provider.complete(message, &self.options).await?;
        Ok(self.normalizer.normalize(&raw))
    }

    async fn lookup_weather(&self, location: Option<&str>) -> Option<WeatherSnapshot> {
        let location = location.map(str::trim).filter(|l| !l.is_empty())?;
        let client = self.weather.as_ref()?;
        match client.current(location).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("🌧️ Weather lookup for '{}' failed: {}", location, e);
                None
            }
        }
    }
}
