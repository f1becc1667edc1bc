use crate::api::*;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

/// The hosted service predictions are mirrored to. Every method may fail; the
/// store treats a failed read as "unavailable" and a failed write as lost.
#[async_trait]
pub trait RemotePredictions {
    /// Predictions newest first, plus the total count if the backend knows it.
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Page>;
    async fn fetch_all(&self) -> Result<Vec<Prediction>>;
    async fn insert(&self, prediction: &Prediction) -> Result<()>;
    async fn upsert(&self, prediction: &Prediction) -> Result<()>;
    async fn record_vote(&self, vote: &VoteRecord) -> Result<()>;
    async fn upsert_user(&self, user: &User) -> Result<()>;
    async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;
}

/// Stand-in used when no backend is configured. Reads are unavailable and
/// writes go nowhere.
#[derive(Debug, Default)]
pub struct Unconfigured;
#[async_trait]
impl RemotePredictions for Unconfigured {
    async fn fetch_page(&self, _limit: usize, _offset: usize) -> Result<Page> {
        bail!("Remote service is not configured")
    }
    async fn fetch_all(&self) -> Result<Vec<Prediction>> {
        bail!("Remote service is not configured")
    }
    async fn insert(&self, _prediction: &Prediction) -> Result<()> {
        bail!("Remote service is not configured")
    }
    async fn upsert(&self, _prediction: &Prediction) -> Result<()> {
        bail!("Remote service is not configured")
    }
    async fn record_vote(&self, _vote: &VoteRecord) -> Result<()> {
        bail!("Remote service is not configured")
    }
    async fn upsert_user(&self, _user: &User) -> Result<()> {
        bail!("Remote service is not configured")
    }
    async fn fetch_leaderboard(&self, _limit: usize) -> Result<Vec<LeaderboardEntry>> {
        bail!("Remote service is not configured")
    }
}

#[derive(Debug, Default)]
struct TestData {
    predictions: Vec<Prediction>,
    votes: Vec<VoteRecord>,
    users: HashMap<UserId, User>,
    /// Pages handed out verbatim instead of slicing `predictions`
    scripted_pages: HashMap<usize, Page>,
    paging_unsupported: bool,
    reads_unavailable: bool,
    writes_fail: bool,
    hide_count: bool,
}

/// In-memory remote for tests. Clones share the same data so a test can keep
/// a handle after boxing one into the store.
#[derive(Debug, Clone, Default)]
pub struct TestRemote {
    data: Arc<Mutex<TestData>>,
    gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
    page_requests: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}
impl TestRemote {
    pub fn with_predictions(predictions: Vec<Prediction>) -> Self {
        let remote = Self::default();
        remote.data().predictions = predictions;
        remote
    }
    fn data(&self) -> MutexGuard<'_, TestData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn set_predictions(&self, predictions: Vec<Prediction>) {
        self.data().predictions = predictions;
    }
    pub fn script_page(&self, offset: usize, page: Page) {
        self.data().scripted_pages.insert(offset, page);
    }
    pub fn set_paging_unsupported(&self, unsupported: bool) {
        self.data().paging_unsupported = unsupported;
    }
    pub fn set_reads_unavailable(&self, unavailable: bool) {
        self.data().reads_unavailable = unavailable;
    }
    pub fn set_writes_fail(&self, fail: bool) {
        self.data().writes_fail = fail;
    }
    pub fn set_hide_count(&self, hide: bool) {
        self.data().hide_count = hide;
    }
    /// Holds every `fetch_page` call until `release` is called.
    pub fn hold_pages(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Semaphore::new(0)));
    }
    pub fn release_pages(&self) {
        if let Some(gate) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
    pub fn remote_prediction(&self, id: &str) -> Option<Prediction> {
        self.data().predictions.iter().find(|p| p.id == id).cloned()
    }
    pub fn votes(&self) -> Vec<VoteRecord> {
        self.data().votes.clone()
    }
    pub fn user(&self, id: &str) -> Option<User> {
        self.data().users.get(id).cloned()
    }
    fn check_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.data().writes_fail {
            bail!("Test remote rejected the write")
        }
        Ok(())
    }
}
#[async_trait]
impl RemotePredictions for TestRemote {
    async fn fetch_page(&self, limit: usize, offset: usize) -> Result<Page> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            // Closed semaphores never happen here, released gates hand out permits
            let _permit = gate.acquire().await;
        }
        let data = self.data();
        if data.reads_unavailable {
            bail!("Test remote is unavailable")
        }
        if data.paging_unsupported {
            bail!("Test remote doesn't support pagination")
        }
        if let Some(page) = data.scripted_pages.get(&offset) {
            return Ok(page.clone());
        }
        let mut sorted = data.predictions.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let items = sorted.into_iter().skip(offset).take(limit).collect();
        let total_count = if data.hide_count {
            None
        } else {
            Some(data.predictions.len())
        };
        Ok(Page::new(items, total_count))
    }
    async fn fetch_all(&self) -> Result<Vec<Prediction>> {
        let data = self.data();
        if data.reads_unavailable {
            bail!("Test remote is unavailable")
        }
        let mut sorted = data.predictions.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sorted)
    }
    async fn insert(&self, prediction: &Prediction) -> Result<()> {
        self.check_write()?;
        let mut data = self.data();
        if data.predictions.iter().any(|p| p.id == prediction.id) {
            return Err(anyhow!("Prediction {} already exists", prediction.id));
        }
        data.predictions.push(prediction.clone());
        Ok(())
    }
    async fn upsert(&self, prediction: &Prediction) -> Result<()> {
        self.check_write()?;
        let mut data = self.data();
        match data.predictions.iter_mut().find(|p| p.id == prediction.id) {
            Some(existing) => *existing = prediction.clone(),
            None => data.predictions.push(prediction.clone()),
        }
        Ok(())
    }
    async fn record_vote(&self, vote: &VoteRecord) -> Result<()> {
        self.check_write()?;
        self.data().votes.push(vote.clone());
        Ok(())
    }
    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.check_write()?;
        self.data().users.insert(user.id.clone(), user.clone());
        Ok(())
    }
    async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let data = self.data();
        if data.reads_unavailable {
            bail!("Test remote is unavailable")
        }
        let mut users = data.users.values().collect::<Vec<_>>();
        users.sort_by(|a, b| b.stats.winnings.cmp(&a.stats.winnings));
        Ok(users
            .into_iter()
            .take(limit)
            .map(LeaderboardEntry::from)
            .collect())
    }
}
