//! Per-user recommendation history, feedback and the insights derived from it.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Feedback, HistoryEntry, StructuredRecommendation};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("recommendation {0} not found")]
    EntryNotFound(Uuid),
}

/// What the caller knows when it records a recommendation.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub weather: String,
    pub occasion: String,
    pub location: Option<String>,
    pub recommendation: StructuredRecommendation,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends an entry, assigning its id and timestamp.
    async fn append(&self, user_id: Uuid, entry: NewEntry) -> Result<HistoryEntry, PersistenceError>;
    /// Oldest first.
    async fn list(&self, user_id: Uuid) -> Result<Vec<HistoryEntry>, PersistenceError>;
    async fn set_feedback(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        feedback: Feedback,
    ) -> Result<HistoryEntry, PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<HashMap<Uuid, Vec<HistoryEntry>>>,
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, user_id: Uuid, entry: NewEntry) -> Result<HistoryEntry, PersistenceError> {
        let stored = HistoryEntry {
            id: Uuid::new_v4(),
            weather: entry.weather,
            occasion: entry.occasion,
            location: entry.location,
            recommendation: entry.recommendation,
            feedback: None,
            created_at: Utc::now(),
        };
        self.entries.write().entry(user_id).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<HistoryEntry>, PersistenceError> {
        Ok(self.entries.read().get(&user_id).cloned().unwrap_or_default())
    }

    async fn set_feedback(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        feedback: Feedback,
    ) -> Result<HistoryEntry, PersistenceError> {
        let mut guard = self.entries.write();
        let entry = guard
            .get_mut(&user_id)
            .and_then(|list| list.iter_mut().find(|e| e.id == entry_id))
            .ok_or(PersistenceError::EntryNotFound(entry_id))?;
        entry.feedback = Some(feedback);
        Ok(entry.clone())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleInsights {
    pub most_common_occasions: BTreeMap<String, usize>,
    pub preferred_weather_conditions: BTreeMap<String, usize>,
    pub average_feedback_score: f64,
    pub total_recommendations: usize,
    pub feedback_count: usize,
}

pub fn insights(entries: &[HistoryEntry]) -> StyleInsights {
    let mut most_common_occasions = BTreeMap::new();
    let mut preferred_weather_conditions = BTreeMap::new();
    let mut rating_total = 0u32;
    let mut feedback_count = 0usize;

    for entry in entries {
        *most_common_occasions.entry(entry.occasion.clone()).or_insert(0) += 1;
        *preferred_weather_conditions.entry(entry.weather.clone()).or_insert(0) += 1;
        if let Some(feedback) = &entry.feedback {
            feedback_count += 1;
            rating_total += u32::from(feedback.rating);
        }
    }

    let average_feedback_score = if feedback_count == 0 {
        0.0
    } else {
        (f64::from(rating_total) / feedback_count as f64 * 100.0).round() / 100.0
    };

    StyleInsights {
        most_common_occasions,
        preferred_weather_conditions,
        average_feedback_score,
        total_recommendations: entries.len(),
        feedback_count,
    }
}
