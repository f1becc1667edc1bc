use rust_decimal::Decimal;
use thiserror::Error;

/// Local validation failures. These are the only errors the store reports to
/// its callers; remote failures are logged and absorbed.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("Vote amount must be positive but was {0}")]
    InvalidAmount(Decimal),
    #[error("Prediction {prediction} can't take another vote of this size")]
    Overflow { prediction: String },
    #[error("Comment text is empty")]
    EmptyComment,
    #[error("Prediction {prediction} has no option {option}")]
    UnknownOption { prediction: String, option: String },
    #[error("A prediction needs at least one option")]
    NoOptions,
    #[error("Seed amount can't be negative but was {0}")]
    NegativeSeed(Decimal),
    #[error("Unknown duration \"{0}\", expected one of 1h, 12h or 24h")]
    UnknownDuration(String),
}
