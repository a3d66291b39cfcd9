// Test doubles for the harvest cycle.
//
// - MockStore (HarvestStore): in-memory accounts and rows, last write wins
// - ScriptedCollector (Collector): per-handle canned posts, failures and delays
// - EventLog: shared, time-stamped record of every call, for ordering assertions

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use roost_common::{Account, Post, SaveSummary};
use roost_store::StoreError;

use crate::collector::{Collector, CollectorSession};
use crate::error::CollectorError;
use crate::orchestrator::Orchestrator;
use crate::traits::HarvestStore;

/// Pacing used by [`orchestrator_with_accounts`].
pub const TEST_PACING: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn account(id: i64, handle: &str) -> Account {
    Account {
        id,
        handle: handle.to_string(),
        active: true,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn post(id: i64, handle: &str, likes: i32) -> Post {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut p = Post::new(id, handle, format!("{handle} post {id}"), at);
    p.likes = likes;
    p
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.entries
            .lock()
            .unwrap()
            .push((Instant::now(), event.into()));
    }

    pub fn events(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// When `event` was first recorded.
    pub fn at(&self, event: &str) -> Option<Instant> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| e == event)
            .map(|(at, _)| *at)
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

pub struct MockStore {
    accounts: Vec<Account>,
    rows: Mutex<HashMap<i64, Post>>,
    log: EventLog,
    fail_init: bool,
    fail_list: bool,
    fail_save_for: Option<String>,
    save_delay: Duration,
}

impl MockStore {
    pub fn new(accounts: Vec<Account>, log: EventLog) -> Self {
        Self {
            accounts,
            rows: Mutex::new(HashMap::new()),
            log,
            fail_init: false,
            fail_list: false,
            fail_save_for: None,
            save_delay: Duration::ZERO,
        }
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Reject any batch whose first post belongs to `handle`.
    pub fn failing_save_for(mut self, handle: &str) -> Self {
        self.fail_save_for = Some(handle.to_string());
        self
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn row(&self, id: i64) -> Option<Post> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl HarvestStore for MockStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        self.log.push("initialize");
        if self.fail_init {
            return Err(StoreError::Database(sqlx_unreachable()));
        }
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.log.push("list_accounts");
        if self.fail_list {
            return Err(StoreError::Database(sqlx_unreachable()));
        }
        Ok(self.accounts.clone())
    }

    async fn save_batch(&self, posts: &[Post]) -> Result<SaveSummary, StoreError> {
        if posts.is_empty() {
            return Err(StoreError::Validation("empty batch".to_string()));
        }
        let handle = posts[0].username.clone();
        self.log.push(format!("save_start:{handle}"));
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        if self.fail_save_for.as_deref() == Some(handle.as_str()) {
            self.log.push(format!("save_failed:{handle}"));
            return Err(StoreError::Transaction(sqlx_unreachable()));
        }

        let mut distinct = HashSet::new();
        {
            let mut rows = self.rows.lock().unwrap();
            for p in posts {
                distinct.insert(p.id);
                rows.insert(p.id, p.clone());
            }
        }

        self.log.push(format!("save_done:{handle}"));
        Ok(SaveSummary {
            processed_count: posts.len(),
            upserted: distinct.len(),
            completed_at: Utc::now(),
        })
    }
}

fn sqlx_unreachable() -> sqlx::Error {
    sqlx::Error::PoolTimedOut
}

// ---------------------------------------------------------------------------
// ScriptedCollector / ScriptedSession
// ---------------------------------------------------------------------------

/// One session's canned behaviour.
pub struct ScriptedSession {
    handle: String,
    posts: Vec<Post>,
    fail_collect: bool,
    fail_logout: bool,
    hang_logout: bool,
    delay: Duration,
    logouts: AtomicUsize,
    log: EventLog,
}

impl ScriptedSession {
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            handle: posts
                .first()
                .map(|p| p.username.clone())
                .unwrap_or_default(),
            posts,
            fail_collect: false,
            fail_logout: false,
            hang_logout: false,
            delay: Duration::ZERO,
            logouts: AtomicUsize::new(0),
            log: EventLog::new(),
        }
    }

    pub fn failing_logout(mut self) -> Self {
        self.fail_logout = true;
        self
    }

    /// Logout that never resolves.
    pub fn hanging_logout(mut self) -> Self {
        self.hang_logout = true;
        self
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectorSession for ScriptedSession {
    async fn collect(&self) -> Result<Vec<Post>, CollectorError> {
        self.log.push(format!("collect:{}", self.handle));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_collect {
            return Err(CollectorError::Other(anyhow!("scrape failed for {}", self.handle)));
        }
        Ok(self.posts.clone())
    }

    async fn logout(&self) -> Result<(), CollectorError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("logout:{}", self.handle));
        if self.hang_logout {
            std::future::pending::<()>().await;
        }
        if self.fail_logout {
            return Err(CollectorError::Session("logout rejected".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    posts: Vec<Post>,
    fail_collect: bool,
    hang_logout: bool,
    delay: Duration,
}

/// Collector whose sessions replay per-handle scripts.
pub struct ScriptedCollector {
    scripts: HashMap<String, Script>,
    log: EventLog,
    sessions: Mutex<Vec<Arc<ScriptedSession>>>,
    fail_open: AtomicBool,
}

impl ScriptedCollector {
    pub fn new(log: EventLog) -> Self {
        Self {
            scripts: HashMap::new(),
            log,
            sessions: Mutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
        }
    }

    pub fn on_posts(mut self, handle: &str, posts: Vec<Post>) -> Self {
        self.scripts.entry(handle.to_string()).or_default().posts = posts;
        self
    }

    pub fn failing_collect(mut self, handle: &str) -> Self {
        self.scripts.entry(handle.to_string()).or_default().fail_collect = true;
        self
    }

    /// Make `handle`'s collect take `delay` (virtual time under a paused clock).
    pub fn slow_collect(mut self, handle: &str, delay: Duration) -> Self {
        self.scripts.entry(handle.to_string()).or_default().delay = delay;
        self
    }

    pub fn hanging_logout(mut self, handle: &str) -> Self {
        self.scripts.entry(handle.to_string()).or_default().hang_logout = true;
        self
    }

    pub fn failing_open(self) -> Self {
        self.fail_open.store(true, Ordering::SeqCst);
        self
    }

    /// Total logouts across every session opened so far.
    pub fn logouts(&self) -> usize {
        self.sessions.lock().unwrap().iter().map(|s| s.logouts()).sum()
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    async fn open_session(
        &self,
        account: &Account,
    ) -> Result<Arc<dyn CollectorSession>, CollectorError> {
        self.log.push(format!("open:{}", account.handle));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CollectorError::Session("login failed".to_string()));
        }
        let script = self.scripts.get(&account.handle);
        let session = Arc::new(ScriptedSession {
            handle: account.handle.clone(),
            posts: script.map(|s| s.posts.clone()).unwrap_or_default(),
            fail_collect: script.map(|s| s.fail_collect).unwrap_or(false),
            fail_logout: false,
            hang_logout: script.map(|s| s.hang_logout).unwrap_or(false),
            delay: script.map(|s| s.delay).unwrap_or_default(),
            logouts: AtomicUsize::new(0),
            log: self.log.clone(),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Orchestrator over a MockStore and ScriptedCollector where every handle
/// yields one post. Pacing is [`TEST_PACING`].
pub fn orchestrator_with_accounts(
    handles: &[&str],
    cancel: CancellationToken,
) -> (Orchestrator, EventLog) {
    let log = EventLog::new();
    let accounts = handles
        .iter()
        .enumerate()
        .map(|(i, h)| account(i as i64 + 1, h))
        .collect();
    let mut collector = ScriptedCollector::new(log.clone());
    for (i, h) in handles.iter().enumerate() {
        collector = collector.on_posts(h, vec![post(i as i64 + 100, h, 1)]);
    }
    let orchestrator = Orchestrator::new(
        Arc::new(MockStore::new(accounts, log.clone())),
        Arc::new(collector),
        TEST_PACING,
        cancel,
    );
    (orchestrator, log)
}
