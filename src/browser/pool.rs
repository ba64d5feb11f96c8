//! Bounded headless-browser session pool
//!
//! Sessions wrap one browser process each; pages are borrowed from a
//! session, marked busy, and returned on release. Bounds at any instant:
//! at most `max_browsers` sessions, at most `max_pages_per_browser` pages
//! per session, and no page held by two callers.
//!
//! Sessions and pages live in two maps keyed by id; a page carries its
//! owning session id, never a back-pointer. Closing a session cascades by
//! scanning the page map for its id.

use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::launch::launch_browser;
use crate::config::ScrapeConfig;
use crate::errors::ScrapeError;
use crate::utils::constants::POOL_SWEEP_INTERVAL;

/// Pool tuning, taken from `ScrapeConfig`.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_browsers: usize,
    pub max_pages_per_browser: usize,
    pub session_timeout: Duration,
    pub max_requests_per_session: u32,
    pub user_agent: String,
    pub headless: bool,
    pub executable: Option<PathBuf>,
}

impl PoolConfig {
    #[must_use]
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            max_browsers: config.max_browsers(),
            max_pages_per_browser: config.max_pages_per_browser(),
            session_timeout: config.session_timeout(),
            max_requests_per_session: config.max_requests_per_browser(),
            user_agent: config.user_agent().to_string(),
            headless: config.headless(),
            executable: config.browser_executable().cloned(),
        }
    }
}

/// One browser process plus its bookkeeping.
struct BrowserSession {
    id: String,
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
    created_at: Instant,
    last_used: Instant,
    request_count: u32,
}

/// One page borrowed out of a session.
struct PageSession {
    id: String,
    page: Page,
    session_id: String,
    created_at: Instant,
    last_used: Instant,
    busy: bool,
}

#[derive(Default)]
struct PoolState {
    sessions: HashMap<String, BrowserSession>,
    pages: HashMap<String, PageSession>,
}

/// Live/cumulative session counts for `getBrowserStats`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BrowserPoolStats {
    pub active_sessions: usize,
    pub total_sessions: u64,
}

/// The pool. All acquisition steps run under one async mutex so
/// concurrent acquirers can never double-launch past `max_browsers` nor
/// race an eviction.
pub struct BrowserPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Cumulative count of sessions ever launched.
    total_sessions: AtomicU64,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

/// A borrowed page. Call [`PageGuard::release`] when done; dropping the
/// guard without releasing frees the page through a spawned task.
pub struct PageGuard {
    pool: Arc<BrowserPool>,
    page: Page,
    session_id: String,
    page_id: String,
    released: bool,
}

impl PageGuard {
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Mark the page free again.
    pub async fn release(mut self) {
        self.released = true;
        self.pool.release_page(&self.page_id).await;
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if !self.released {
            let pool = Arc::clone(&self.pool);
            let page_id = self.page_id.clone();
            tokio::spawn(async move {
                pool.release_page(&page_id).await;
            });
        }
    }
}

/// Metadata-only reuse decision: a session is reusable while it has
/// budget left and has been used within the timeout.
fn pick_reusable<'a>(
    sessions: impl Iterator<Item = (&'a String, Instant, u32)>,
    now: Instant,
    session_timeout: Duration,
    max_requests: u32,
) -> Option<String> {
    sessions
        .filter(|(_, last_used, request_count)| {
            *request_count < max_requests && now.duration_since(*last_used) < session_timeout
        })
        // Prefer the most recently used session so idle ones can expire
        .max_by_key(|(_, last_used, _)| *last_used)
        .map(|(id, _, _)| id.clone())
}

/// Metadata-only eviction choice: the session with the smallest `last_used`.
fn pick_eviction<'a>(sessions: impl Iterator<Item = (&'a String, Instant)>) -> Option<String> {
    sessions
        .min_by_key(|(_, last_used)| *last_used)
        .map(|(id, _)| id.clone())
}

impl BrowserPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(PoolState::default()),
            total_sessions: AtomicU64::new(0),
            sweeper: parking_lot::Mutex::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Start the idle sweep that closes pages and sessions unused for
    /// longer than the session timeout. Busy pages are never touched.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let pool = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(POOL_SWEEP_INTERVAL);
            interval.tick().await;
            while !pool.shutdown.load(Ordering::Relaxed) {
                interval.tick().await;
                pool.sweep_idle().await;
            }
        }));
    }

    /// Borrow a page, creating or recycling sessions as needed.
    pub async fn acquire(self: &Arc<Self>) -> Result<PageGuard, ScrapeError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ScrapeError::Browser {
                message: "browser pool is shut down".into(),
            });
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();

        // 1. Reuse a session with budget left
        let session_id = pick_reusable(
            state
                .sessions
                .values()
                .map(|s| (&s.id, s.last_used, s.request_count)),
            now,
            self.config.session_timeout,
            self.config.max_requests_per_session,
        );

        let session_id = match session_id {
            Some(id) => id,
            None => {
                // 2. Launch while under the bound, 3. otherwise evict LRU.
                // The launch happens with the lock held: acquisition must
                // stay serialized, and a slot cannot be reserved any other
                // way without letting a racer double-launch.
                if state.sessions.len() >= self.config.max_browsers {
                    // Prefer a victim with no borrowed pages; fall back to
                    // strict LRU when every session has one out.
                    let victim = pick_eviction(
                        state
                            .sessions
                            .values()
                            .filter(|s| {
                                !state
                                    .pages
                                    .values()
                                    .any(|p| p.session_id == s.id && p.busy)
                            })
                            .map(|s| (&s.id, s.last_used)),
                    )
                    .or_else(|| {
                        pick_eviction(state.sessions.values().map(|s| (&s.id, s.last_used)))
                    });
                    if let Some(victim_id) = victim {
                        info!(session = %victim_id, "Evicting least-recently-used browser session");
                        Self::close_session(&mut state, &victim_id).await;
                    }
                }
                self.launch_session(&mut state).await?
            }
        };

        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.last_used = now;
            session.request_count += 1;
        }

        let page_id = self.acquire_page(&mut state, &session_id).await?;
        let page = state
            .pages
            .get(&page_id)
            .map(|p| p.page.clone())
            .ok_or_else(|| ScrapeError::Browser {
                message: "acquired page vanished from pool".into(),
            })?;

        debug!(session = %session_id, page = %page_id, "Acquired pooled page");

        Ok(PageGuard {
            pool: Arc::clone(self),
            page,
            session_id,
            page_id,
            released: false,
        })
    }

    async fn launch_session(&self, state: &mut PoolState) -> Result<String, ScrapeError> {
        let id = Uuid::new_v4().to_string();
        let user_data_dir = std::env::temp_dir().join(format!("coursescrape_chrome_{id}"));

        let (browser, handler) = launch_browser(
            self.config.headless,
            self.config.executable.clone(),
            &self.config.user_agent,
            user_data_dir.clone(),
        )
        .await
        .map_err(|e| {
            // A failed launch leaves no session behind; the reserved slot
            // frees with the lock.
            ScrapeError::Browser {
                message: format!("failed to launch browser: {e:#}"),
            }
        })?;

        let now = Instant::now();
        info!(session = %id, "Browser session created");
        self.total_sessions.fetch_add(1, Ordering::Relaxed);

        state.sessions.insert(
            id.clone(),
            BrowserSession {
                id: id.clone(),
                browser,
                handler,
                user_data_dir,
                created_at: now,
                last_used: now,
                request_count: 0,
            },
        );

        Ok(id)
    }

    /// Pick or create a free page within `session_id`, marking it busy.
    async fn acquire_page(
        &self,
        state: &mut PoolState,
        session_id: &str,
    ) -> Result<String, ScrapeError> {
        let now = Instant::now();

        // Reuse the first free page of this session
        let free = state
            .pages
            .values()
            .find(|p| p.session_id == session_id && !p.busy)
            .map(|p| p.id.clone());
        if let Some(page_id) = free {
            if let Some(page) = state.pages.get_mut(&page_id) {
                page.busy = true;
                page.last_used = now;
            }
            return Ok(page_id);
        }

        let page_count = state
            .pages
            .values()
            .filter(|p| p.session_id == session_id)
            .count();

        if page_count >= self.config.max_pages_per_browser {
            // At capacity with every page busy: evict the page idle longest.
            // A busy page is never reclaimed out from under its holder.
            let victim = state
                .pages
                .values()
                .filter(|p| p.session_id == session_id && !p.busy)
                .min_by_key(|p| p.last_used)
                .map(|p| p.id.clone());
            match victim {
                Some(victim_id) => {
                    if let Some(old) = state.pages.remove(&victim_id) {
                        debug!(
                            page = %victim_id,
                            age = ?old.created_at.elapsed(),
                            "Evicting oldest page in session"
                        );
                        if let Err(e) = old.page.close().await {
                            warn!(page = %victim_id, "Failed to close evicted page: {e}");
                        }
                    }
                }
                None => {
                    return Err(ScrapeError::Browser {
                        message: format!(
                            "all {} pages busy in session {session_id}",
                            self.config.max_pages_per_browser
                        ),
                    });
                }
            }
        }

        let session = state
            .sessions
            .get(session_id)
            .ok_or_else(|| ScrapeError::Browser {
                message: format!("session {session_id} vanished during page acquisition"),
            })?;

        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser {
                message: format!("failed to open page: {e}"),
            })?;

        let page_id = Uuid::new_v4().to_string();
        state.pages.insert(
            page_id.clone(),
            PageSession {
                id: page_id.clone(),
                page,
                session_id: session_id.to_string(),
                created_at: now,
                last_used: now,
                busy: true,
            },
        );

        Ok(page_id)
    }

    /// Mark a page free again.
    async fn release_page(&self, page_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(page) = state.pages.get_mut(page_id) {
            page.busy = false;
            page.last_used = Instant::now();
            debug!(page = %page_id, "Released pooled page");
        }
    }

    /// Close one session and cascade over its pages.
    async fn close_session(state: &mut PoolState, session_id: &str) {
        let page_ids: Vec<String> = state
            .pages
            .values()
            .filter(|p| p.session_id == session_id)
            .map(|p| p.id.clone())
            .collect();
        for page_id in page_ids {
            if let Some(page) = state.pages.remove(&page_id) {
                if let Err(e) = page.page.close().await {
                    debug!(page = %page_id, "Page close during session teardown: {e}");
                }
            }
        }

        if let Some(mut session) = state.sessions.remove(session_id) {
            if let Err(e) = session.browser.close().await {
                warn!(session = %session_id, "Failed to close browser: {e}");
            }
            let _ = session.browser.wait().await;
            session.handler.abort();
            if let Err(e) = std::fs::remove_dir_all(&session.user_data_dir) {
                debug!(
                    "Failed to remove user data dir {}: {e}",
                    session.user_data_dir.display()
                );
            }
            info!(
                session = %session_id,
                requests = session.request_count,
                uptime = ?session.created_at.elapsed(),
                "Browser session closed"
            );
        }
    }

    /// Close idle pages and sessions. Busy pages pin their session.
    async fn sweep_idle(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let timeout = self.config.session_timeout;

        // Idle free pages first
        let stale_pages: Vec<String> = state
            .pages
            .values()
            .filter(|p| !p.busy && now.duration_since(p.last_used) > timeout)
            .map(|p| p.id.clone())
            .collect();
        for page_id in stale_pages {
            if let Some(page) = state.pages.remove(&page_id) {
                debug!(page = %page_id, "Idle sweep closing page");
                if let Err(e) = page.page.close().await {
                    debug!(page = %page_id, "Page close during idle sweep: {e}");
                }
            }
        }

        // Then sessions with no busy pages left
        let stale_sessions: Vec<String> = state
            .sessions
            .values()
            .filter(|s| now.duration_since(s.last_used) > timeout)
            .map(|s| s.id.clone())
            .collect();
        for session_id in stale_sessions {
            let has_busy = state
                .pages
                .values()
                .any(|p| p.session_id == session_id && p.busy);
            if !has_busy {
                debug!(session = %session_id, "Idle sweep closing session");
                Self::close_session(&mut state, &session_id).await;
            }
        }
    }

    /// Close every session and stop the sweeper.
    pub async fn cleanup(&self) {
        info!("Shutting down browser pool");
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        let mut state = self.state.lock().await;
        let session_ids: Vec<String> = state.sessions.keys().cloned().collect();
        for session_id in session_ids {
            Self::close_session(&mut state, &session_id).await;
        }
        state.pages.clear();
        info!("Browser pool shutdown complete");
    }

    /// Live and cumulative session counts.
    pub async fn stats(&self) -> BrowserPoolStats {
        let state = self.state.lock().await;
        BrowserPoolStats {
            active_sessions: state.sessions.len(),
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
        }
    }

    /// The user agent pooled sessions are launched with.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_reusable_respects_budget_and_timeout() {
        let now = Instant::now();
        let timeout = Duration::from_millis(500);
        let fresh = "fresh".to_string();
        let spent = "spent".to_string();
        let stale = "stale".to_string();

        let sessions = vec![
            (&fresh, now - Duration::from_millis(10), 3u32),
            (&spent, now - Duration::from_millis(5), 50u32),
            (&stale, now - Duration::from_millis(600), 1u32),
        ];

        let picked = pick_reusable(sessions.into_iter(), now, timeout, 50);
        assert_eq!(picked.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_pick_reusable_none_when_all_exhausted() {
        let now = Instant::now();
        let a = "a".to_string();
        let sessions = vec![(&a, now, 50u32)];
        let picked = pick_reusable(sessions.into_iter(), now, Duration::from_millis(500), 50);
        assert!(picked.is_none());
    }

    #[test]
    fn test_pick_reusable_prefers_most_recent() {
        let now = Instant::now();
        let older = "older".to_string();
        let newer = "newer".to_string();
        let sessions = vec![
            (&older, now - Duration::from_millis(100), 0u32),
            (&newer, now - Duration::from_millis(1), 0u32),
        ];
        let picked = pick_reusable(sessions.into_iter(), now, Duration::from_millis(500), 50);
        assert_eq!(picked.as_deref(), Some("newer"));
    }

    #[test]
    fn test_pick_eviction_is_least_recently_used() {
        let now = Instant::now();
        let a = "a".to_string();
        let b = "b".to_string();
        let c = "c".to_string();
        let sessions = vec![
            (&a, now - Duration::from_millis(50)),
            (&b, now - Duration::from_millis(400)),
            (&c, now - Duration::from_millis(5)),
        ];
        let picked = pick_eviction(sessions.into_iter());
        assert_eq!(picked.as_deref(), Some("b"));
    }

    #[test]
    fn test_pick_eviction_empty() {
        let sessions: Vec<(&String, Instant)> = Vec::new();
        assert!(pick_eviction(sessions.into_iter()).is_none());
    }
}
