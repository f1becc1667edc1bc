//! The loosely typed record shape the backend stores and returns.
//!
//! Nested fields may come back either as JSON-encoded strings (how rows are
//! written) or as native JSON, and numbers may be strings. Everything past
//! `normalize` works on the strongly typed [`Prediction`].

use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::warn;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Value,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub votes: Value,
    #[serde(default)]
    pub pool: Value,
    #[serde(default)]
    pub comments: Value,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub duration: Value,
    #[serde(default, alias = "created_at")]
    pub created_at: Value,
    #[serde(default)]
    pub author: Value,
    #[serde(default, alias = "top_voters")]
    pub top_voters: Value,
}

impl PredictionRow {
    /// Decodes the row with a fallback for every field except `id`.
    pub fn normalize(self) -> Result<Prediction> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or(anyhow!("Prediction row has no id"))?;
        let options: Vec<PredictionOption> = decode_nested(self.options, "options", vec![]);
        let option_votes = options
            .iter()
            .fold(0u64, |total, o| total.saturating_add(o.votes));
        let votes = lenient_i64(&self.votes).unwrap_or(0).max(0) as u64;
        if votes != option_votes {
            warn!(
                "Prediction {} has {} votes but its options add up to {}, using the options",
                id, votes, option_votes
            );
        }
        Ok(Prediction {
            title: match self.title {
                Value::String(title) => title,
                Value::Null => String::new(),
                other => other.to_string(),
            },
            thumbnail: self.thumbnail.filter(|t| !t.is_empty()),
            votes: option_votes,
            pool: lenient_decimal(&self.pool)
                .unwrap_or_default()
                .max(Decimal::ZERO),
            comments: decode_nested(self.comments, "comments", vec![]),
            options,
            duration: lenient_i64(&self.duration)
                .and_then(Duration::try_milliseconds)
                .unwrap_or_else(Duration::zero),
            created_at: lenient_timestamp(&self.created_at).unwrap_or_else(Utc::now),
            author: decode_nested(self.author, "author", Author::default()),
            top_voters: decode_nested(self.top_voters, "topVoters", vec![]),
            id,
        })
    }
    /// Decodes a list of rows and skips the ones that can't be salvaged.
    pub fn normalize_all(rows: Vec<PredictionRow>) -> Vec<Prediction> {
        rows.into_iter()
            .filter_map(|row| match row.normalize() {
                Ok(prediction) => Some(prediction),
                Err(e) => {
                    warn!("Skipping prediction row: {:#}", e);
                    None
                }
            })
            .collect()
    }
}

impl From<&Prediction> for PredictionRow {
    fn from(p: &Prediction) -> Self {
        Self {
            id: Some(p.id.clone()),
            title: Value::String(p.title.clone()),
            thumbnail: p.thumbnail.clone(),
            votes: Value::from(p.votes),
            pool: Value::String(p.pool.to_string()),
            comments: encode_nested(&p.comments),
            options: encode_nested(&p.options),
            duration: Value::from(p.duration.num_milliseconds()),
            created_at: Value::from(p.created_at.timestamp_millis()),
            author: encode_nested(&p.author),
            top_voters: encode_nested(&p.top_voters),
        }
    }
}

fn encode_nested<T: Serialize>(value: &T) -> Value {
    match serde_json::to_string(value) {
        Ok(json) => Value::String(json),
        Err(_) => Value::Null,
    }
}

fn decode_nested<T: DeserializeOwned>(value: Value, field: &str, fallback: T) -> T {
    let decoded = match value {
        Value::Null => return fallback,
        Value::String(json) => serde_json::from_str(&json),
        other => serde_json::from_value(other),
    };
    decoded.unwrap_or_else(|e| {
        warn!("Couldn't decode {}: {}", field, e);
        fallback
    })
}

pub fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| lenient_decimal(value).and_then(|d| d.trunc().to_i64())),
        _ => None,
    }
}

pub fn lenient_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

pub fn lenient_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(_) => Utc.timestamp_millis_opt(lenient_i64(value)?).single(),
        Value::String(s) => match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
            Err(_) => Utc.timestamp_millis_opt(lenient_i64(value)?).single(),
        },
        _ => None,
    }
}
