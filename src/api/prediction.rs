use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::*;

pub type PredictionId = String;
pub type OptionId = String;
pub type UserId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: PredictionId,
    pub title: String,
    pub thumbnail: Option<String>,
    pub votes: u64,
    pub pool: Decimal,
    pub options: Vec<PredictionOption>,
    pub comments: Vec<Comment>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Snapshot of the creator taken when the prediction was made. It is not
    /// refreshed when the user record changes.
    pub author: Author,
    /// Display-only avatars, same staleness rules as `author`.
    pub top_voters: Vec<TopVoter>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionOption {
    pub id: OptionId,
    pub label: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub votes: u64,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub user: CommentAuthor,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CommentAuthor {
    pub username: String,
    pub avatar: String,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Author {
    pub username: String,
    pub avatar: String,
    #[serde(default)]
    pub twitter: String,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopVoter {
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub twitter: String,
    pub avatar: String,
    #[serde(default)]
    pub stats: UserStats,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserStats {
    pub votes: u64,
    /// Percentage between 0 and 100
    pub accuracy: Decimal,
    pub winnings: Decimal,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub id: UserId,
    pub username: String,
    pub avatar: String,
    pub score: Decimal,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub prediction_id: PredictionId,
    pub user_id: UserId,
    pub option_selected: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub items: Vec<Prediction>,
    pub total_count: Option<usize>,
    /// Rows the remote returned, including any dropped while decoding
    pub received: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationPreset {
    OneHour,
    TwelveHours,
    OneDay,
}
