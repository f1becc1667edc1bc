use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use secp256k1::rand::{self, distributions::Alphanumeric, Rng};

use super::*;

const ID_LEN: usize = 16;

/// Random alphanumeric id for records created on this device.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Rounds to cents, midpoints away from zero. Pools are never negative so
/// this is plain half-up.
pub fn round_pool(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Prediction {
    /// Saturates at the ends of the calendar for out of range durations.
    pub fn closes_at(&self) -> DateTime<Utc> {
        match self.created_at.checked_add_signed(self.duration) {
            Some(closes_at) => closes_at,
            None if self.duration < Duration::zero() => DateTime::<Utc>::MIN_UTC,
            None => DateTime::<Utc>::MAX_UTC,
        }
    }
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        now < self.closes_at()
    }
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.closes_at() - now;
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }
    pub fn option_index(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|o| o.id == option)
    }
    pub fn option_votes(&self) -> u64 {
        self.options
            .iter()
            .fold(0u64, |total, o| total.saturating_add(o.votes))
    }
    pub fn votes_consistent(&self) -> bool {
        self.votes == self.option_votes()
    }
    /// Returns the prediction as it looks after one more ballot on `option`.
    /// The ballot counts once no matter the stake, the stake goes to the pool.
    pub fn with_vote(&self, option: &str, amount: Decimal) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(amount));
        }
        let index = self
            .option_index(option)
            .ok_or_else(|| ValidationError::UnknownOption {
                prediction: self.id.clone(),
                option: option.to_string(),
            })?;
        let overflow = || ValidationError::Overflow {
            prediction: self.id.clone(),
        };
        let mut updated = self.clone();
        updated.options[index].votes = self.options[index]
            .votes
            .checked_add(1)
            .ok_or_else(overflow)?;
        updated.votes = self.votes.checked_add(1).ok_or_else(overflow)?;
        updated.pool = round_pool(self.pool.checked_add(amount).ok_or_else(overflow)?);
        Ok(updated)
    }
    /// Newest comments come first.
    pub fn with_comment(&self, comment: Comment) -> Self {
        let mut updated = self.clone();
        updated.comments.insert(0, comment);
        updated
    }
}

impl Page {
    pub fn new(items: Vec<Prediction>, total_count: Option<usize>) -> Self {
        Self {
            received: items.len(),
            items,
            total_count,
        }
    }
}

impl Comment {
    pub fn new(user: CommentAuthor, text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment);
        }
        Ok(Self {
            id: generate_id(),
            user,
            text: text.to_string(),
            timestamp: Utc::now(),
        })
    }
}

impl Author {
    pub fn anonymous() -> Self {
        Self {
            username: "anon".into(),
            avatar: "https://i.pravatar.cc/150?img=66".into(),
            twitter: "@anon".into(),
        }
    }
}
impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            twitter: user.twitter.clone(),
        }
    }
}
impl From<&User> for CommentAuthor {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}
impl From<&Author> for CommentAuthor {
    fn from(author: &Author) -> Self {
        Self {
            username: author.username.clone(),
            avatar: author.avatar.clone(),
        }
    }
}
impl From<&User> for LeaderboardEntry {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            score: user.stats.winnings,
        }
    }
}

impl DurationPreset {
    pub fn duration(&self) -> Duration {
        match self {
            Self::OneHour => Duration::hours(1),
            Self::TwelveHours => Duration::hours(12),
            Self::OneDay => Duration::hours(24),
        }
    }
}
impl Default for DurationPreset {
    fn default() -> Self {
        DurationPreset::OneDay
    }
}
impl Display for DurationPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::OneHour => "1h",
            Self::TwelveHours => "12h",
            Self::OneDay => "24h",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for DurationPreset {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1h" => Ok(Self::OneHour),
            "12h" => Ok(Self::TwelveHours),
            "24h" | "1d" => Ok(Self::OneDay),
            e => Err(ValidationError::UnknownDuration(e.to_string())),
        }
    }
}

impl Display for Prediction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({} votes, pool {})",
            self.id, self.title, self.votes, self.pool
        )?;
        for option in &self.options {
            write!(f, "\n    {}: {} ({} votes)", option.id, option.label, option.votes)?;
        }
        Ok(())
    }
}
