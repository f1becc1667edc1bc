use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PageResponse {
    pub items: Vec<PredictionRow>,
    /// Total number of predictions on the backend, if it knows
    #[serde(default)]
    pub count: Option<usize>,
}
