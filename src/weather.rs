use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::models::WeatherSnapshot;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("incomplete weather payload")] Incomplete,
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn current(&self, location: &str) -> Result<WeatherSnapshot, WeatherError>;
}

/// OpenWeatherMap "current weather" client, metric units.
pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenWeatherClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Self {
        Self { client: Client::new(), api_key, base_url, timeout }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: Option<MainReadings>,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings { temp: f64, humidity: f64 }

#[derive(Debug, Deserialize)]
struct Condition { main: String }

#[async_trait]
impl WeatherLookup for OpenWeatherClient {
    async fn current(&self, location: &str) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/weather", self.base_url.trim_end_matches('/'));
        let response = self.client
            .get(&url)
            .query(&[("q", location), ("appid", self.api_key.as_str()), ("units", "metric")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(redacted)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WeatherError::Http(format!("status={} body={}", status, body)));
        }

        let payload: CurrentWeather = response.json().await.map_err(redacted)?;
        let main = payload.main.ok_or(WeatherError::Incomplete)?;
        let condition = payload.weather.into_iter().next().ok_or(WeatherError::Incomplete)?;
        Ok(WeatherSnapshot { temperature: main.temp, condition: condition.main, humidity: main.humidity })
    }
}

/// reqwest errors print the request URL, and the URL carries `appid`.
fn redacted(e: reqwest::Error) -> WeatherError {
    WeatherError::Http(e.without_url().to_string())
}

#[cfg(test)]
pub mod fake {
    use super::*;

    pub struct FakeWeather(pub Option<WeatherSnapshot>);

    #[async_trait]
    impl WeatherLookup for FakeWeather {
        async fn current(&self, _location: &str) -> Result<WeatherSnapshot, WeatherError> {
            self.0.clone().ok_or_else(|| WeatherError::Http("station offline".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn client(base: String) -> OpenWeatherClient {
        OpenWeatherClient::new("weather-key".into(), base, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn reads_temperature_condition_and_humidity() {
        let app = Router::new().route(
            "/weather",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["q"], "São Paulo");
                assert_eq!(q["appid"], "weather-key");
                assert_eq!(q["units"], "metric");
                Json(json!({ "main": { "temp": 21.5, "humidity": 80 }, "weather": [{ "main": "Rain" }] }))
            }),
        );
        let snapshot = client(serve(app).await).current("São Paulo").await.unwrap();
        assert_eq!(snapshot, WeatherSnapshot { temperature: 21.5, condition: "Rain".into(), humidity: 80.0 });
    }

    #[tokio::test]
    async fn missing_sections_are_incomplete() {
        let app = Router::new().route("/weather", get(|| async { Json(json!({ "weather": [] })) }));
        let err = client(serve(app).await).current("Nowhere").await.unwrap_err();
        assert!(matches!(err, WeatherError::Incomplete));
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_the_api_key() {
        let client = OpenWeatherClient::new("owm-secret-key".into(), "http://127.0.0.1:9".into(), Duration::from_secs(2));
        let err = client.current("Dublin").await.unwrap_err();
        assert!(matches!(err, WeatherError::Http(_)));
        assert!(!err.to_string().contains("owm-secret-key"), "{err}");
    }

    #[tokio::test]
    async fn undecodable_payload_does_not_leak_the_api_key() {
        let app = Router::new().route("/weather", get(|| async { "not json" }));
        let err = client(serve(app).await).current("Dublin").await.unwrap_err();
        assert!(!err.to_string().contains("weather-key"), "{err}");
    }

    #[tokio::test]
    async fn unknown_city_is_an_http_error() {
        let app = Router::new().route("/weather", get(|| async { (StatusCode::NOT_FOUND, "city not found") }));
        let err = client(serve(app).await).current("Atlantis").await.unwrap_err();
        assert!(matches!(err, WeatherError::Http(_)));
    }
}
