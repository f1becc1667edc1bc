use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::*;

const UNTITLED: &str = "Untitled Prediction";

// Requests
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PageQuery {
    pub limit: usize,
    pub offset: usize,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// Everything a user fills in when launching a prediction. `build` turns it
/// into a prediction that is ready to be handed to the store.
#[derive(Debug, Clone, Default)]
pub struct NewPrediction {
    pub title: String,
    pub thumbnail: Option<String>,
    pub options: Vec<NewOption>,
    pub duration: DurationPreset,
    pub seed: Decimal,
    pub author: Option<Author>,
}
#[derive(Debug, Clone, Default)]
pub struct NewOption {
    pub label: String,
    pub image: Option<String>,
}
impl NewOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            image: None,
        }
    }
}
impl NewPrediction {
    pub fn build(self) -> Result<Prediction, ValidationError> {
        if self.seed < Decimal::ZERO {
            return Err(ValidationError::NegativeSeed(self.seed));
        }
        let options = self
            .options
            .into_iter()
            .filter(|option| !option.label.trim().is_empty())
            .enumerate()
            .map(|(i, option)| PredictionOption {
                id: format!("o{}", i + 1),
                label: option.label.trim().to_string(),
                image: option.image,
                votes: 0,
            })
            .collect::<Vec<_>>();
        if options.is_empty() {
            return Err(ValidationError::NoOptions);
        }
        let title = match self.title.trim() {
            "" => UNTITLED.to_string(),
            title => title.to_string(),
        };
        Ok(Prediction {
            id: generate_id(),
            title,
            thumbnail: self.thumbnail,
            votes: 0,
            pool: round_pool(self.seed),
            options,
            comments: vec![],
            duration: self.duration.duration(),
            created_at: Utc::now(),
            author: self.author.unwrap_or_else(Author::anonymous),
            top_voters: vec![],
        })
    }
}
