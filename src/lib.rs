//! Client-side prediction state for a social prediction market.
//!
//! [`store::PredictionStore`] keeps the session's predictions, applies votes,
//! comments and new predictions locally right away and mirrors them to a
//! [`remote::RemotePredictions`] service in the background.

pub mod api;
pub mod client;
pub mod db;
pub mod remote;
pub mod settings;
pub mod store;
