use anyhow::{bail, Result};
use async_trait::async_trait;
use log::trace;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::api::*;
use crate::remote::RemotePredictions;

pub async fn bail_if_err(response: Response, expected_code: StatusCode) -> Result<Response> {
    if response.status() != expected_code {
        bail!("{}: {}", response.status(), response.text().await?)
    }
    Ok(response)
}

/// Remote prediction service spoken to over HTTP.
pub struct HttpRemote {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}
impl HttpRemote {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
    pub fn with_timeout(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("X-Api-Key", key),
            None => request,
        }
    }
    async fn get(&self, path: &str, expected_code: StatusCode) -> Result<Response> {
        trace!("GET {}{}", self.url, path);
        let response = self
            .authorize(self.client.get(self.url.clone() + path))
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn post(
        &self,
        path: &str,
        request: &impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        trace!("POST {}{}", self.url, path);
        let response = self
            .authorize(self.client.post(self.url.clone() + path))
            .json(request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn put(
        &self,
        path: &str,
        request: &impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        trace!("PUT {}{}", self.url, path);
        let response = self
            .authorize(self.client.put(self.url.clone() + path))
            .json(request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    /// Ballots recorded for `prediction`, oldest first.
    pub async fn fetch_votes(&self, prediction: &str) -> Result<Vec<VoteRecord>> {
        let path = format!("/predictions/{}/votes", prediction);
        let response = self.get(&path, StatusCode::OK).await?;
        Ok(response.json::<Vec<VoteRecord>>().await?)
    }
}
#[async_trait]
impl RemotePredictions for HttpRemote {
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Page> {
        let path = format!("/predictions?limit={}&offset={}", limit, offset);
        let response = self.get(&path, StatusCode::OK).await?;
        let page = response.json::<PageResponse>().await?;
        Ok(Page {
            received: page.items.len(),
            items: PredictionRow::normalize_all(page.items),
            total_count: page.count,
        })
    }
    async fn fetch_all(&self) -> Result<Vec<Prediction>> {
        let response = self.get("/predictions/all", StatusCode::OK).await?;
        let rows = response.json::<Vec<PredictionRow>>().await?;
        Ok(PredictionRow::normalize_all(rows))
    }
    async fn insert(&self, prediction: &Prediction) -> Result<()> {
        self.post(
            "/predictions",
            &PredictionRow::from(prediction),
            StatusCode::CREATED,
        )
        .await?;
        Ok(())
    }
    async fn upsert(&self, prediction: &Prediction) -> Result<()> {
        self.put("/predictions", &PredictionRow::from(prediction), StatusCode::OK)
            .await?;
        Ok(())
    }
    async fn record_vote(&self, vote: &VoteRecord) -> Result<()> {
        self.post("/votes", vote, StatusCode::CREATED).await?;
        Ok(())
    }
    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.put("/users", user, StatusCode::OK).await?;
        Ok(())
    }
    async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let path = format!("/leaderboard?limit={}", limit);
        let response = self.get(&path, StatusCode::OK).await?;
        Ok(response.json::<Vec<LeaderboardEntry>>().await?)
    }
}
