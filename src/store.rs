use crate::api::*;
use crate::remote::RemotePredictions;
use log::{debug, error, trace, warn};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Read-only copy of the store handed to whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Newest first, ids are unique
    pub predictions: Vec<Prediction>,
    pub offset: usize,
    pub has_more: bool,
    pub loading: bool,
    pub refreshing: bool,
    pub loading_more: bool,
}
impl Default for Snapshot {
    fn default() -> Self {
        Self {
            predictions: vec![],
            offset: 0,
            has_more: true,
            loading: false,
            refreshing: false,
            loading_more: false,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    snapshot: Snapshot,
    /// Bumped by every refresh so pages requested before it can be dropped
    generation: u64,
    user: Option<User>,
    leaderboard: Vec<LeaderboardEntry>,
}

/// Background remote writes started by a local mutation. Dropping it leaves
/// the writes running.
#[derive(Debug)]
pub struct RemoteSync {
    handle: JoinHandle<bool>,
}
impl RemoteSync {
    fn spawn<F>(writes: F) -> Self
    where
        F: Future<Output = bool> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(writes),
        }
    }
    /// Waits for the writes and tells whether all of them reached the remote.
    pub async fn settled(self) -> bool {
        self.handle.await.unwrap_or(false)
    }
}

fn settled(what: impl Display, result: anyhow::Result<()>) -> bool {
    match result {
        Ok(()) => {
            trace!("Remote {} done", what);
            true
        }
        Err(e) => {
            warn!("Remote {} failed: {:#}", what, e);
            false
        }
    }
}

/// Appends the predictions whose id isn't present yet. Existing entries are
/// never replaced.
fn merge_new(predictions: &mut Vec<Prediction>, items: Vec<Prediction>) -> usize {
    let mut seen = predictions
        .iter()
        .map(|p| p.id.clone())
        .collect::<HashSet<_>>();
    let before = predictions.len();
    for item in items {
        if seen.insert(item.id.clone()) {
            predictions.push(item);
        }
    }
    predictions.len() - before
}

/// Session-wide owner of the predictions list. Local changes apply at once and
/// are mirrored to the remote in the background; the remote never overrides a
/// local change during the session.
pub struct PredictionStore {
    remote: Arc<Box<dyn RemotePredictions + Send + Sync>>,
    state: Mutex<State>,
    page_size: usize,
}

impl PredictionStore {
    pub fn new(remote: Box<dyn RemotePredictions + Send + Sync>, page_size: usize) -> Self {
        Self {
            remote: Arc::new(remote),
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn page_size(&self) -> usize {
        self.page_size
    }
    pub fn snapshot(&self) -> Snapshot {
        self.state().snapshot.clone()
    }
    pub fn prediction(&self, id: &str) -> Option<Prediction> {
        self.state()
            .snapshot
            .predictions
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }
    pub fn user(&self) -> Option<User> {
        self.state().user.clone()
    }
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.state().leaderboard.clone()
    }
    fn more_available(&self, merged_len: usize, page_len: usize, total: Option<usize>) -> bool {
        match total {
            Some(total) => merged_len < total,
            None => page_len >= self.page_size,
        }
    }

    /// First load of the session, only hits the remote while nothing is shown.
    pub async fn load(&self) {
        {
            let mut state = self.state();
            if !state.snapshot.predictions.is_empty() {
                return;
            }
            state.snapshot.loading = true;
        }
        self.refresh().await;
    }

    /// Replaces everything with the first page. Falls back to fetching the
    /// whole collection if paging fails.
    pub async fn refresh(&self) {
        {
            let mut state = self.state();
            if state.snapshot.refreshing {
                debug!("Refresh already in flight");
                return;
            }
            state.snapshot.refreshing = true;
            state.generation += 1;
        }
        let (predictions, has_more) = match self.remote.fetch_page(self.page_size, 0).await {
            Ok(page) => {
                let mut predictions = vec![];
                merge_new(&mut predictions, page.items);
                let has_more =
                    self.more_available(predictions.len(), page.received, page.total_count);
                (Some((predictions, page.received)), has_more)
            }
            Err(e) => {
                warn!("Couldn't fetch first page, fetching everything: {:#}", e);
                match self.remote.fetch_all().await {
                    Ok(items) => {
                        let mut predictions = vec![];
                        merge_new(&mut predictions, items);
                        let received = predictions.len();
                        (Some((predictions, received)), false)
                    }
                    Err(e) => {
                        warn!("Couldn't fetch predictions: {:#}", e);
                        (None, false)
                    }
                }
            }
        };
        let mut state = self.state();
        if let Some((predictions, received)) = predictions {
            debug!("Refreshed {} predictions", predictions.len());
            // Rows dropped while decoding still count towards the cursor
            state.snapshot.offset = received;
            state.snapshot.predictions = predictions;
        }
        state.snapshot.has_more = has_more;
        state.snapshot.refreshing = false;
        state.snapshot.loading = false;
    }

    /// Appends the next page. Calls made while a page or a refresh is in
    /// flight are dropped.
    pub async fn load_more(&self) {
        let (offset, generation) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let snapshot = &mut state.snapshot;
            if snapshot.loading_more || snapshot.refreshing || !snapshot.has_more {
                trace!("Not loading more predictions");
                return;
            }
            snapshot.loading_more = true;
            (snapshot.offset, state.generation)
        };
        let result = self.remote.fetch_page(self.page_size, offset).await;
        let mut guard = self.state();
        let state = &mut *guard;
        state.snapshot.loading_more = false;
        if state.generation != generation {
            debug!("Dropping page at offset {}, predictions were refreshed", offset);
            return;
        }
        let snapshot = &mut state.snapshot;
        match result {
            Ok(page) if page.received > 0 => {
                let page_len = page.received;
                let added = merge_new(&mut snapshot.predictions, page.items);
                // Duplicates still move the cursor
                snapshot.offset = offset + page_len;
                snapshot.has_more =
                    self.more_available(snapshot.predictions.len(), page_len, page.total_count);
                debug!(
                    "Loaded {} predictions at offset {}, {} new",
                    page_len, offset, added
                );
            }
            Ok(_) => {
                debug!("No predictions past offset {}", offset);
                snapshot.has_more = false;
            }
            Err(e) => {
                warn!("Couldn't fetch predictions at offset {}: {:#}", offset, e);
                snapshot.has_more = false;
            }
        }
    }

    /// Shows the prediction right away and inserts it remotely in the
    /// background.
    pub fn create(&self, prediction: Prediction) -> RemoteSync {
        self.state()
            .snapshot
            .predictions
            .insert(0, prediction.clone());
        debug!("Created prediction {}: {}", prediction.id, prediction.title);
        let remote = self.remote.clone();
        RemoteSync::spawn(async move {
            let result = remote.insert(&prediction).await;
            settled(format_args!("insert of {}", prediction.id), result)
        })
    }

    /// Casts one ballot on `option` and adds `amount` to the pool. Returns
    /// `Ok(None)` if the prediction isn't loaded.
    pub fn vote(
        &self,
        prediction: &str,
        option: &str,
        amount: Decimal,
    ) -> Result<Option<RemoteSync>, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(amount));
        }
        let (updated, record) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let slot = match state
                .snapshot
                .predictions
                .iter_mut()
                .find(|p| p.id == prediction)
            {
                Some(slot) => slot,
                None => {
                    debug!("Vote on unknown prediction {} ignored", prediction);
                    return Ok(None);
                }
            };
            let index = slot
                .option_index(option)
                .ok_or_else(|| ValidationError::UnknownOption {
                    prediction: prediction.to_string(),
                    option: option.to_string(),
                })?;
            let mut updated = slot.with_vote(option, amount)?;
            if !updated.votes_consistent() {
                error!(
                    "Prediction {} has {} votes but its options add up to {}",
                    updated.id,
                    updated.votes,
                    updated.option_votes()
                );
                updated.votes = updated.option_votes();
            }
            *slot = updated.clone();
            let record = state.user.as_mut().map(|user| {
                user.stats.votes += 1;
                VoteRecord {
                    prediction_id: updated.id.clone(),
                    user_id: user.id.clone(),
                    option_selected: index,
                    amount,
                }
            });
            (updated, record)
        };
        debug!(
            "Voted {} on option {} of prediction {}, pool is now {}",
            amount, option, prediction, updated.pool
        );
        let remote = self.remote.clone();
        Ok(Some(RemoteSync::spawn(async move {
            let upsert = async {
                let result = remote.upsert(&updated).await;
                settled(format_args!("upsert of {}", updated.id), result)
            };
            let record = async {
                match &record {
                    Some(vote) => {
                        let result = remote.record_vote(vote).await;
                        settled(
                            format_args!("vote record on {}", vote.prediction_id),
                            result,
                        )
                    }
                    None => true,
                }
            };
            let (upserted, recorded) = tokio::join!(upsert, record);
            upserted && recorded
        })))
    }

    /// Puts `comment` first in the prediction's comments. Returns `Ok(None)`
    /// if the prediction isn't loaded.
    pub fn comment(
        &self,
        prediction: &str,
        comment: Comment,
    ) -> Result<Option<RemoteSync>, ValidationError> {
        let text = comment.text.trim().to_string();
        if text.is_empty() {
            return Err(ValidationError::EmptyComment);
        }
        let comment = Comment { text, ..comment };
        let updated = {
            let mut state = self.state();
            let slot = match state
                .snapshot
                .predictions
                .iter_mut()
                .find(|p| p.id == prediction)
            {
                Some(slot) => slot,
                None => {
                    debug!("Comment on unknown prediction {} ignored", prediction);
                    return Ok(None);
                }
            };
            *slot = slot.with_comment(comment);
            slot.clone()
        };
        debug!("Commented on prediction {}", prediction);
        let remote = self.remote.clone();
        Ok(Some(RemoteSync::spawn(async move {
            let result = remote.upsert(&updated).await;
            settled(format_args!("upsert of {}", updated.id), result)
        })))
    }

    /// Makes `user` the session user and saves the profile remotely.
    pub fn sign_in(&self, user: User) -> RemoteSync {
        debug!("Signed in as {} ({})", user.username, user.id);
        self.state().user = Some(user.clone());
        let remote = self.remote.clone();
        RemoteSync::spawn(async move {
            let result = remote.upsert_user(&user).await;
            settled(format_args!("upsert of user {}", user.id), result)
        })
    }
    pub fn sign_out(&self) {
        if let Some(user) = self.state().user.take() {
            debug!("Signed out {}", user.id);
        }
    }

    /// Keeps the previous leaderboard if the remote can't be reached.
    pub async fn load_leaderboard(&self, limit: usize) {
        match self.remote.fetch_leaderboard(limit).await {
            Ok(entries) => {
                debug!("Loaded {} leaderboard entries", entries.len());
                self.state().leaderboard = entries;
            }
            Err(e) => warn!("Couldn't fetch leaderboard: {:#}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::remote::TestRemote;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn option(id: &str, votes: u64) -> PredictionOption {
        PredictionOption {
            id: id.into(),
            label: id.to_uppercase(),
            image: None,
            votes,
        }
    }
    /// Larger `n` means older, so ascending ids come back newest first.
    fn prediction(id: &str, n: i64) -> Prediction {
        Prediction {
            id: id.into(),
            title: format!("Prediction {}", id),
            thumbnail: None,
            votes: 0,
            pool: Decimal::ZERO,
            options: vec![option("optA", 0), option("optB", 0)],
            comments: vec![],
            duration: Duration::hours(24),
            created_at: Utc::now() - Duration::minutes(n),
            author: Author::anonymous(),
            top_voters: vec![],
        }
    }
    fn numbered(range: std::ops::RangeInclusive<i64>) -> Vec<Prediction> {
        range.map(|i| prediction(&i.to_string(), i)).collect()
    }
    fn ids(store: &PredictionStore) -> Vec<String> {
        store
            .snapshot()
            .predictions
            .into_iter()
            .map(|p| p.id)
            .collect()
    }
    fn test_user() -> User {
        User {
            id: "u1".into(),
            username: "panda".into(),
            twitter: "@panda".into(),
            avatar: "panda.png".into(),
            stats: UserStats::default(),
        }
    }
    fn store_with(remote: &TestRemote, page_size: usize) -> PredictionStore {
        PredictionStore::new(Box::new(remote.clone()), page_size)
    }

    #[tokio::test]
    async fn vote_rounds_pool_and_counts_one_ballot() {
        let mut a = prediction("1", 0);
        a.options = vec![option("optA", 3), option("optB", 2)];
        a.votes = 5;
        a.pool = dec!(10.00);
        let remote = TestRemote::with_predictions(vec![a]);
        let store = store_with(&remote, 10);
        store.refresh().await;

        let sync = store.vote("1", "optA", dec!(2.555)).unwrap().unwrap();
        let voted = store.prediction("1").unwrap();
        assert_eq!(voted.options[0].votes, 4);
        assert_eq!(voted.options[1].votes, 2);
        assert_eq!(voted.votes, 6);
        assert_eq!(voted.pool, dec!(12.56));

        assert!(sync.settled().await);
        assert_eq!(remote.remote_prediction("1").unwrap(), voted);
        // Nobody signed in, so there is no vote record
        assert!(remote.votes().is_empty());
    }
    #[tokio::test]
    async fn vote_rejects_non_positive_amounts() {
        let remote = TestRemote::with_predictions(vec![prediction("1", 0)]);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let before = store.snapshot();
        assert_eq!(
            store.vote("1", "optA", Decimal::ZERO).unwrap_err(),
            ValidationError::InvalidAmount(Decimal::ZERO)
        );
        assert_eq!(
            store.vote("1", "optA", dec!(-3)).unwrap_err(),
            ValidationError::InvalidAmount(dec!(-3))
        );
        assert_eq!(store.snapshot(), before);
        assert_eq!(remote.writes(), 0);
    }
    #[tokio::test]
    async fn vote_on_unknown_prediction_or_option() {
        let remote = TestRemote::with_predictions(vec![prediction("1", 0)]);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let before = store.snapshot();
        assert!(store.vote("missing", "optA", dec!(1)).unwrap().is_none());
        assert!(matches!(
            store.vote("1", "optZ", dec!(1)),
            Err(ValidationError::UnknownOption { .. })
        ));
        assert_eq!(store.snapshot(), before);
        assert_eq!(remote.writes(), 0);
    }
    #[tokio::test]
    async fn votes_always_match_option_totals() {
        let remote = TestRemote::with_predictions(numbered(1..=3));
        let store = store_with(&remote, 10);
        store.refresh().await;
        let mut syncs = vec![];
        for (i, amount) in [dec!(0.01), dec!(1.005), dec!(7), dec!(0.333)]
            .into_iter()
            .cycle()
            .take(20)
            .enumerate()
        {
            let prediction = ((i % 3) + 1).to_string();
            let option = if i % 2 == 0 { "optA" } else { "optB" };
            syncs.push(store.vote(&prediction, option, amount).unwrap().unwrap());
        }
        for prediction in store.snapshot().predictions {
            assert!(prediction.votes_consistent());
            assert!(prediction.votes > 0);
        }
        assert_eq!(
            store
                .snapshot()
                .predictions
                .iter()
                .map(|p| p.votes)
                .sum::<u64>(),
            20
        );
        futures_util::future::join_all(syncs.into_iter().map(|s| s.settled())).await;
        assert_eq!(remote.writes(), 20);
    }
    #[tokio::test]
    async fn signed_in_votes_are_recorded() {
        let remote = TestRemote::with_predictions(vec![prediction("1", 0)]);
        let store = store_with(&remote, 10);
        store.refresh().await;
        assert!(store.sign_in(test_user()).settled().await);
        assert_eq!(remote.user("u1"), Some(test_user()));

        let sync = store.vote("1", "optB", dec!(0.5)).unwrap().unwrap();
        assert!(sync.settled().await);
        assert_eq!(
            remote.votes(),
            vec![VoteRecord {
                prediction_id: "1".into(),
                user_id: "u1".into(),
                option_selected: 1,
                amount: dec!(0.5),
            }]
        );
        assert_eq!(store.user().unwrap().stats.votes, 1);

        store.sign_out();
        assert!(store.user().is_none());
        store.vote("1", "optB", dec!(0.5)).unwrap().unwrap().settled().await;
        assert_eq!(remote.votes().len(), 1);
    }
    #[tokio::test]
    async fn remote_failures_keep_local_changes() {
        let remote = TestRemote::with_predictions(vec![prediction("1", 0)]);
        let store = store_with(&remote, 10);
        store.refresh().await;
        remote.set_writes_fail(true);

        let created = prediction("new", -1);
        assert!(!store.create(created.clone()).settled().await);
        assert!(!store
            .vote("1", "optA", dec!(1))
            .unwrap()
            .unwrap()
            .settled()
            .await);
        let comment = Comment::new(CommentAuthor::default(), "still here").unwrap();
        assert!(!store
            .comment("1", comment)
            .unwrap()
            .unwrap()
            .settled()
            .await);

        assert_eq!(ids(&store), vec!["new", "1"]);
        let local = store.prediction("1").unwrap();
        assert_eq!(local.votes, 1);
        assert_eq!(local.comments[0].text, "still here");
        assert!(remote.remote_prediction("new").is_none());
        assert_eq!(remote.remote_prediction("1").unwrap().votes, 0);
    }
    #[tokio::test]
    async fn create_prepends_and_inserts() {
        let remote = TestRemote::with_predictions(numbered(1..=2));
        let store = store_with(&remote, 10);
        store.refresh().await;
        let draft = NewPrediction {
            title: "Fresh".into(),
            options: vec![NewOption::new("Yes"), NewOption::new("No")],
            ..Default::default()
        }
        .build()
        .unwrap();
        let id = draft.id.clone();
        let sync = store.create(draft);
        assert_eq!(ids(&store)[0], id);
        assert!(sync.settled().await);
        assert_eq!(remote.remote_prediction(&id).unwrap().title, "Fresh");
    }
    #[tokio::test]
    async fn comment_goes_first_and_blank_is_rejected() {
        let remote = TestRemote::with_predictions(vec![prediction("1", 0)]);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let author = CommentAuthor {
            username: "panda".into(),
            avatar: "panda.png".into(),
        };
        let before = store.snapshot();
        let mut blank = Comment::new(author.clone(), "x").unwrap();
        blank.text = "   \n\t".into();
        assert_eq!(
            store.comment("1", blank).unwrap_err(),
            ValidationError::EmptyComment
        );
        assert_eq!(store.snapshot(), before);

        let first = Comment::new(author.clone(), "first").unwrap();
        store.comment("1", first).unwrap().unwrap();
        let second = Comment::new(author, "  second  ").unwrap();
        let sync = store.comment("1", second).unwrap().unwrap();
        let comments = store.prediction("1").unwrap().comments;
        assert_eq!(comments[0].text, "second");
        assert_eq!(comments[1].text, "first");
        assert!(sync.settled().await);
        assert_eq!(remote.remote_prediction("1").unwrap().comments.len(), 2);
        assert!(store
            .comment("missing", Comment::new(CommentAuthor::default(), "hi").unwrap())
            .unwrap()
            .is_none());
    }
    #[tokio::test]
    async fn refresh_replaces_local_state() {
        let remote = TestRemote::with_predictions(numbered(20..=22));
        let store = store_with(&remote, 10);
        store.refresh().await;
        assert_eq!(ids(&store), vec!["20", "21", "22"]);

        remote.set_predictions(numbered(1..=15));
        store.refresh().await;
        let expected = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>();
        assert_eq!(ids(&store), expected);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.offset, 10);
        assert!(snapshot.has_more);
        assert!(!snapshot.refreshing);

        remote.set_predictions(numbered(3..=5));
        store.refresh().await;
        assert_eq!(ids(&store), vec!["3", "4", "5"]);
        assert_eq!(store.snapshot().offset, 3);
        assert!(!store.snapshot().has_more);
    }
    #[tokio::test]
    async fn refresh_guesses_has_more_without_count() {
        let remote = TestRemote::with_predictions(numbered(1..=10));
        remote.set_hide_count(true);
        let store = store_with(&remote, 10);
        store.refresh().await;
        assert!(store.snapshot().has_more);

        remote.set_predictions(numbered(1..=9));
        store.refresh().await;
        assert!(!store.snapshot().has_more);
    }
    #[tokio::test]
    async fn refresh_falls_back_to_full_fetch() {
        let remote = TestRemote::with_predictions(numbered(1..=12));
        remote.set_paging_unsupported(true);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.predictions.len(), 12);
        assert_eq!(snapshot.offset, 12);
        assert!(!snapshot.has_more);
    }
    #[tokio::test]
    async fn refresh_with_remote_down_stays_empty() {
        let remote = TestRemote::with_predictions(numbered(1..=3));
        remote.set_reads_unavailable(true);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let snapshot = store.snapshot();
        assert!(snapshot.predictions.is_empty());
        assert!(!snapshot.has_more);
        assert!(!snapshot.refreshing);
        // Nothing to page through either
        store.load_more().await;
        assert_eq!(remote.page_requests(), 1);
    }
    #[tokio::test]
    async fn refresh_with_remote_down_keeps_what_is_shown() {
        let remote = TestRemote::with_predictions(numbered(1..=3));
        let store = store_with(&remote, 10);
        store.refresh().await;
        remote.set_reads_unavailable(true);
        store.refresh().await;
        assert_eq!(ids(&store), vec!["1", "2", "3"]);
        assert!(!store.snapshot().has_more);
    }
    #[tokio::test]
    async fn load_more_merges_without_duplicates() {
        let remote = TestRemote::with_predictions(numbered(1..=10));
        remote.set_hide_count(true);
        let store = store_with(&remote, 10);
        store.refresh().await;
        assert!(store.snapshot().has_more);

        remote.script_page(
            10,
            Page::new(
                vec![
                    prediction("9", 9),
                    prediction("10", 10),
                    prediction("11", 11),
                    prediction("12", 12),
                ],
                None,
            ),
        );
        let untouched = store.prediction("9").unwrap();
        store.load_more().await;
        let snapshot = store.snapshot();
        let expected = (1..=12).map(|i| i.to_string()).collect::<Vec<_>>();
        assert_eq!(ids(&store), expected);
        assert_eq!(snapshot.offset, 14);
        assert!(!snapshot.has_more);
        // Already known entries are not overwritten
        assert_eq!(store.prediction("9").unwrap(), untouched);
    }
    #[tokio::test]
    async fn load_more_uses_total_count_at_the_boundary() {
        let remote = TestRemote::with_predictions(numbered(1..=12));
        let store = store_with(&remote, 10);
        store.refresh().await;
        assert!(store.snapshot().has_more);
        store.load_more().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.predictions.len(), 12);
        assert_eq!(snapshot.offset, 12);
        assert!(!snapshot.has_more);

        let remote = TestRemote::with_predictions(numbered(1..=13));
        let store = store_with(&remote, 5);
        store.refresh().await;
        store.load_more().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.predictions.len(), 10);
        assert!(snapshot.has_more);
        store.load_more().await;
        assert!(!store.snapshot().has_more);
        assert_eq!(store.snapshot().predictions.len(), 13);
    }
    #[tokio::test]
    async fn vote_that_would_overflow_is_rejected() {
        let mut full_pool = prediction("1", 0);
        full_pool.pool = Decimal::MAX;
        let mut full_option = prediction("2", 1);
        full_option.options = vec![option("optA", u64::MAX)];
        full_option.votes = u64::MAX;
        let remote = TestRemote::with_predictions(vec![full_pool, full_option]);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let before = store.snapshot();

        assert_eq!(
            store.vote("1", "optA", Decimal::ONE).unwrap_err(),
            ValidationError::Overflow {
                prediction: "1".into()
            }
        );
        assert!(matches!(
            store.vote("1", "optA", Decimal::MAX),
            Err(ValidationError::Overflow { .. })
        ));
        assert!(matches!(
            store.vote("2", "optA", dec!(1)),
            Err(ValidationError::Overflow { .. })
        ));
        assert_eq!(store.snapshot(), before);
        assert_eq!(remote.writes(), 0);
    }
    #[tokio::test]
    async fn dropped_rows_still_advance_the_cursor() {
        let remote = TestRemote::with_predictions(numbered(1..=12));
        remote.set_hide_count(true);
        // One of the ten rows couldn't be decoded
        remote.script_page(
            0,
            Page {
                items: numbered(1..=9),
                total_count: None,
                received: 10,
            },
        );
        let store = store_with(&remote, 10);
        store.refresh().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.predictions.len(), 9);
        assert_eq!(snapshot.offset, 10);
        assert!(snapshot.has_more);

        store.load_more().await;
        let snapshot = store.snapshot();
        assert_eq!(ids(&store).last().unwrap(), "12");
        assert_eq!(snapshot.predictions.len(), 11);
        assert_eq!(snapshot.offset, 12);
        assert!(!snapshot.has_more);
    }
    #[tokio::test]
    async fn load_more_stops_on_empty_page() {
        let remote = TestRemote::with_predictions(numbered(1..=10));
        remote.set_hide_count(true);
        let store = store_with(&remote, 10);
        store.refresh().await;
        let before = store.snapshot().predictions;
        store.load_more().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.predictions, before);
        assert_eq!(snapshot.offset, 10);
        assert!(!snapshot.has_more);
        store.load_more().await;
        assert_eq!(remote.page_requests(), 2);
    }
    #[tokio::test]
    async fn concurrent_load_more_sends_one_request() {
        let remote = TestRemote::with_predictions(numbered(1..=4));
        let store = store_with(&remote, 10);
        remote.hold_pages();
        tokio::join!(store.load_more(), async {
            assert!(store.snapshot().loading_more);
            store.load_more().await;
            remote.release_pages();
        });
        assert_eq!(remote.page_requests(), 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.predictions.len(), 4);
        assert_eq!(snapshot.offset, 4);
        assert!(!snapshot.loading_more);
    }
    #[tokio::test]
    async fn page_requested_before_refresh_is_dropped() {
        let remote = TestRemote::with_predictions(numbered(1..=3));
        let store = store_with(&remote, 2);
        store.refresh().await;
        assert_eq!(store.snapshot().offset, 2);
        remote.hold_pages();
        tokio::join!(store.load_more(), async {
            remote.release_pages();
            store.refresh().await;
        });
        let snapshot = store.snapshot();
        assert_eq!(ids(&store), vec!["1", "2"]);
        assert_eq!(snapshot.offset, 2);
        assert!(snapshot.has_more);
        assert!(!snapshot.loading_more);
    }
    #[tokio::test]
    async fn load_only_fetches_when_empty() {
        let remote = TestRemote::with_predictions(numbered(1..=3));
        let store = store_with(&remote, 10);
        store.load().await;
        assert_eq!(store.snapshot().predictions.len(), 3);
        assert!(!store.snapshot().loading);
        store.load().await;
        assert_eq!(remote.page_requests(), 1);
    }
    #[tokio::test]
    async fn leaderboard_survives_failed_reload() {
        let remote = TestRemote::default();
        let store = store_with(&remote, 10);
        let mut user = test_user();
        user.stats.winnings = dec!(42);
        store.sign_in(user).settled().await;
        store.load_leaderboard(10).await;
        assert_eq!(store.leaderboard()[0].score, dec!(42));
        remote.set_reads_unavailable(true);
        store.load_leaderboard(10).await;
        assert_eq!(store.leaderboard().len(), 1);
    }
}
