use crate::api::*;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{query, Executor, Row, SqlitePool};
use std::str::FromStr;

pub type RowId = i64;

#[async_trait]
pub trait DB {
    async fn get_predictions_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<PredictionRow>, usize)>;
    async fn get_predictions(&self) -> Result<Vec<PredictionRow>>;
    async fn add_prediction(&self, prediction: PredictionRow) -> Result<()>;
    async fn upsert_prediction(&self, prediction: PredictionRow) -> Result<()>;
    async fn add_vote(&self, vote: VoteRecord) -> Result<RowId>;
    async fn get_votes(&self, prediction: &str) -> Result<Vec<VoteRecord>>;
    async fn upsert_user(&self, user: User) -> Result<()>;
    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;
}

pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    pub async fn new(db_conn: Option<String>) -> Result<Self> {
        let url = db_conn.unwrap_or("sqlite::memory:".to_string());
        // Every connection to :memory: opens its own empty database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let connection = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .with_context(|| format!("couldn't open database {}", url))?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS predictions (\
                id TEXT PRIMARY KEY NOT NULL,\
                title TEXT NOT NULL,\
                thumbnail TEXT,\
                votes INTEGER NOT NULL DEFAULT 0,\
                pool TEXT NOT NULL DEFAULT '0',\
                comments TEXT DEFAULT '[]',\
                options TEXT NOT NULL,\
                duration INTEGER NOT NULL,\
                created_at INTEGER NOT NULL,\
                author TEXT NOT NULL,\
                top_voters TEXT DEFAULT '[]'\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS votes (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                prediction_id TEXT NOT NULL,\
                user_id TEXT NOT NULL,\
                option_selected INTEGER NOT NULL,\
                amount TEXT NOT NULL,\
                timestamp INTEGER NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS users (\
                id TEXT PRIMARY KEY NOT NULL,\
                username TEXT NOT NULL,\
                twitter_handle TEXT,\
                avatar_url TEXT,\
                votes_count INTEGER NOT NULL DEFAULT 0,\
                accuracy_percentage TEXT NOT NULL DEFAULT '0',\
                winnings_amount TEXT NOT NULL DEFAULT '0',\
                updated_at INTEGER\
                )",
            )
            .await?;
        Ok(Self { connection })
    }
}

/// Flattens a row into the column values the predictions table stores.
struct Columns {
    id: String,
    title: String,
    thumbnail: Option<String>,
    votes: i64,
    pool: String,
    comments: String,
    options: String,
    duration: i64,
    created_at: i64,
    author: String,
    top_voters: String,
}
impl Columns {
    fn from_row(row: PredictionRow) -> Result<Self> {
        let id = match row.id {
            Some(id) if !id.is_empty() => id,
            _ => bail!("Prediction row has no id"),
        };
        Ok(Self {
            id,
            title: match row.title {
                Value::String(title) => title,
                _ => String::new(),
            },
            thumbnail: row.thumbnail,
            votes: lenient_i64(&row.votes).unwrap_or(0),
            pool: lenient_decimal(&row.pool).unwrap_or_default().to_string(),
            comments: json_text(row.comments, "[]"),
            options: json_text(row.options, "[]"),
            duration: lenient_i64(&row.duration).unwrap_or(0),
            created_at: lenient_timestamp(&row.created_at)
                .unwrap_or_else(Utc::now)
                .timestamp_millis(),
            author: json_text(row.author, "null"),
            top_voters: json_text(row.top_voters, "[]"),
        })
    }
}
fn json_text(value: Value, empty: &str) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => empty.to_string(),
        other => other.to_string(),
    }
}
fn prediction_row(row: &SqliteRow) -> PredictionRow {
    PredictionRow {
        id: Some(row.get("id")),
        title: Value::String(row.get("title")),
        thumbnail: row.get("thumbnail"),
        votes: Value::from(row.get::<i64, _>("votes")),
        pool: Value::String(row.get("pool")),
        comments: row
            .get::<Option<String>, _>("comments")
            .map(Value::String)
            .unwrap_or_default(),
        options: Value::String(row.get("options")),
        duration: Value::from(row.get::<i64, _>("duration")),
        created_at: Value::from(row.get::<i64, _>("created_at")),
        author: Value::String(row.get("author")),
        top_voters: row
            .get::<Option<String>, _>("top_voters")
            .map(Value::String)
            .unwrap_or_default(),
    }
}

#[async_trait]
impl DB for SQLite {
    async fn get_predictions_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<PredictionRow>, usize)> {
        let rows = self
            .connection
            .fetch_all(
                query("SELECT * FROM predictions ORDER BY created_at DESC LIMIT ? OFFSET ?")
                    .bind(limit as i64)
                    .bind(offset as i64),
            )
            .await
            .context("couldn't get predictions page")?;
        let count: i64 = self
            .connection
            .fetch_one(query("SELECT COUNT(*) FROM predictions"))
            .await?
            .get(0);
        Ok((rows.iter().map(prediction_row).collect(), count as usize))
    }
    async fn get_predictions(&self) -> Result<Vec<PredictionRow>> {
        let rows = self
            .connection
            .fetch_all(query("SELECT * FROM predictions ORDER BY created_at DESC"))
            .await
            .context("couldn't get predictions")?;
        Ok(rows.iter().map(prediction_row).collect())
    }
    async fn add_prediction(&self, prediction: PredictionRow) -> Result<()> {
        let c = Columns::from_row(prediction)?;
        self.connection
            .execute(
                query(
                    "INSERT INTO predictions (\
                    id,\
                    title,\
                    thumbnail,\
                    votes,\
                    pool,\
                    comments,\
                    options,\
                    duration,\
                    created_at,\
                    author,\
                    top_voters)\
                    VALUES (?,?,?,?,?,?,?,?,?,?,?)",
                )
                .bind(c.id.clone())
                .bind(c.title)
                .bind(c.thumbnail)
                .bind(c.votes)
                .bind(c.pool)
                .bind(c.comments)
                .bind(c.options)
                .bind(c.duration)
                .bind(c.created_at)
                .bind(c.author)
                .bind(c.top_voters),
            )
            .await
            .with_context(|| format!("couldn't insert prediction {}", c.id))?;
        Ok(())
    }
    async fn upsert_prediction(&self, prediction: PredictionRow) -> Result<()> {
        let c = Columns::from_row(prediction)?;
        self.connection
            .execute(
                query(
                    "INSERT INTO predictions (\
                    id,\
                    title,\
                    thumbnail,\
                    votes,\
                    pool,\
                    comments,\
                    options,\
                    duration,\
                    created_at,\
                    author,\
                    top_voters)\
                    VALUES (?,?,?,?,?,?,?,?,?,?,?) \
                    ON CONFLICT(id) DO UPDATE SET \
                    title = excluded.title,\
                    thumbnail = excluded.thumbnail,\
                    votes = excluded.votes,\
                    pool = excluded.pool,\
                    comments = excluded.comments,\
                    options = excluded.options,\
                    duration = excluded.duration,\
                    author = excluded.author,\
                    top_voters = excluded.top_voters",
                )
                .bind(c.id.clone())
                .bind(c.title)
                .bind(c.thumbnail)
                .bind(c.votes)
                .bind(c.pool)
                .bind(c.comments)
                .bind(c.options)
                .bind(c.duration)
                .bind(c.created_at)
                .bind(c.author)
                .bind(c.top_voters),
            )
            .await
            .with_context(|| format!("couldn't upsert prediction {}", c.id))?;
        Ok(())
    }
    async fn add_vote(&self, vote: VoteRecord) -> Result<RowId> {
        let id = self
            .connection
            .execute(
                query(
                    "INSERT INTO votes (\
                    prediction_id,\
                    user_id,\
                    option_selected,\
                    amount,\
                    timestamp)\
                    VALUES (?,?,?,?,?)",
                )
                .bind(vote.prediction_id)
                .bind(vote.user_id)
                .bind(vote.option_selected as i64)
                .bind(vote.amount.to_string())
                .bind(Utc::now().timestamp_millis()),
            )
            .await?
            .last_insert_rowid();
        Ok(id)
    }
    async fn get_votes(&self, prediction: &str) -> Result<Vec<VoteRecord>> {
        let rows = self
            .connection
            .fetch_all(
                query("SELECT * FROM votes WHERE prediction_id = ? ORDER BY id").bind(prediction),
            )
            .await?;
        let mut votes = vec![];
        for row in rows {
            votes.push(VoteRecord {
                prediction_id: row.get("prediction_id"),
                user_id: row.get("user_id"),
                option_selected: row.get::<i64, _>("option_selected") as usize,
                amount: Decimal::from_str(row.get("amount"))?,
            });
        }
        Ok(votes)
    }
    async fn upsert_user(&self, user: User) -> Result<()> {
        self.connection
            .execute(
                query(
                    "INSERT INTO users (\
                    id,\
                    username,\
                    twitter_handle,\
                    avatar_url,\
                    votes_count,\
                    accuracy_percentage,\
                    winnings_amount,\
                    updated_at)\
                    VALUES (?,?,?,?,?,?,?,?) \
                    ON CONFLICT(id) DO UPDATE SET \
                    username = excluded.username,\
                    twitter_handle = excluded.twitter_handle,\
                    avatar_url = excluded.avatar_url,\
                    votes_count = excluded.votes_count,\
                    accuracy_percentage = excluded.accuracy_percentage,\
                    winnings_amount = excluded.winnings_amount,\
                    updated_at = excluded.updated_at",
                )
                .bind(user.id.clone())
                .bind(user.username)
                .bind(Some(user.twitter).filter(|t| !t.is_empty()))
                .bind(Some(user.avatar).filter(|a| !a.is_empty()))
                .bind(user.stats.votes as i64)
                .bind(user.stats.accuracy.to_string())
                .bind(user.stats.winnings.to_string())
                .bind(Utc::now().timestamp_millis()),
            )
            .await
            .with_context(|| format!("couldn't upsert user {}", user.id))?;
        Ok(())
    }
    async fn get_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        // Amounts are stored as decimal text, so the ordering happens here
        let rows = self
            .connection
            .fetch_all(query("SELECT * FROM users"))
            .await?;
        let mut entries = vec![];
        for row in rows {
            let votes: i64 = row.get("votes_count");
            entries.push((
                LeaderboardEntry {
                    id: row.get("id"),
                    username: row.get("username"),
                    avatar: row
                        .get::<Option<String>, _>("avatar_url")
                        .unwrap_or_default(),
                    score: Decimal::from_str(row.get("winnings_amount"))?,
                },
                votes,
            ));
        }
        entries.sort_by(|(a, a_votes), (b, b_votes)| {
            b.score.cmp(&a.score).then(b_votes.cmp(a_votes))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(entry, _)| entry)
            .collect())
    }
}
