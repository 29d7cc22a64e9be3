use crate::error::SessionError;
use crate::types::{NewSession, Session, SessionKey};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

pub const SESSION_TTL: Duration = Duration::from_secs(120);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(2);
const MAX_KEY_ATTEMPTS: u32 = 8;

type KeySource = Box<dyn Fn() -> SessionKey + Send + Sync>;

struct Entry {
    session: Session,
    inserted: Instant,
}

/// Short-lived sessions keyed by unguessable keys. Entries older than the
/// TTL are invisible to `get` and removed by the sweeper.
pub struct SessionStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
    ttl: Duration,
    keys: KeySource,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            keys: Box::new(SessionKey::generate),
        }
    }

    /// Replaces the key generator.
    pub fn with_key_source(
        mut self,
        keys: impl Fn() -> SessionKey + Send + Sync + 'static,
    ) -> Self {
        self.keys = Box::new(keys);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a session under a key no live entry uses.
    pub fn put(&self, new: NewSession) -> Result<SessionKey, SessionError> {
        let mut entries = self.lock();
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = (self.keys)();
            if entries.contains_key(&key) {
                debug!("session key collision, drawing again");
                continue;
            }
            let session = Session {
                key: key.clone(),
                repo: new.repo,
                findings: new.findings,
                created_at: Utc::now(),
            };
            entries.insert(
                key.clone(),
                Entry {
                    session,
                    inserted: Instant::now(),
                },
            );
            return Ok(key);
        }
        Err(SessionError::KeyCollision {
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    pub fn get(&self, key: &SessionKey) -> Result<Session, SessionError> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| entry.inserted.elapsed() < self.ttl)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| SessionError::NotFound {
                key: key.to_string(),
            })
    }

    /// Removes `key`; absent keys are fine.
    pub fn remove(&self, key: &SessionKey) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry at or past the TTL and returns how many went.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Starts the periodic sweep. The task runs until the handle is stopped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> SweepHandle {
        let store = Arc::clone(self);
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        let evicted = store.evict_expired();
                        if evicted > 0 {
                            debug!(evicted, "swept expired sessions");
                        }
                    }
                }
            }
            info!("session sweeper stopped");
        });
        SweepHandle {
            shutdown: Some(shutdown),
            task,
        }
    }
}

/// Owner of a running sweep task.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signals the sweeper and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentId, Finding, RepoRef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_session() -> NewSession {
        NewSession {
            repo: RepoRef::new("faker", "proj"),
            findings: vec![Finding::format("a.go", ContentId::from("111"))],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_then_get_returns_same_contents() {
        let store = SessionStore::new();
        let key = store.put(new_session()).unwrap();
        let session = store.get(&key).unwrap();
        assert_eq!(session.key, key);
        assert_eq!(session.repo, RepoRef::new("faker", "proj"));
        assert_eq!(session.findings.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_puts_get_distinct_keys() {
        let store = SessionStore::new();
        let a = store.put(new_session()).unwrap();
        let b = store.put(new_session()).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_key_is_not_found() {
        let store = SessionStore::new();
        let err = store.get(&SessionKey::generate()).unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        let key = store.put(new_session()).unwrap();
        store.remove(&key);
        store.remove(&key);
        assert!(store.get(&key).is_err());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = SessionStore::new();
        let key = store.put(new_session()).unwrap();
        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(store.get(&key).is_ok());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&key).is_err());
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_colliding_key_source_retries_then_gives_up() {
        let fixed = SessionKey::generate();
        let draws = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&draws);
        let store = SessionStore::new().with_key_source(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            fixed.clone()
        });
        store.put(new_session()).unwrap();
        let err = store.put(new_session()).unwrap_err();
        assert!(matches!(err, SessionError::KeyCollision { attempts: 8 }));
        assert_eq!(draws.load(Ordering::SeqCst), 9);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collision_redraws_until_unused() {
        let first = SessionKey::generate();
        let second = SessionKey::generate();
        let sequence = Mutex::new(vec![second.clone(), first.clone(), first.clone()]);
        let store = SessionStore::new().with_key_source(move || {
            sequence
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(SessionKey::generate)
        });
        assert_eq!(store.put(new_session()).unwrap(), first);
        assert_eq!(store.put(new_session()).unwrap(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_and_stops() {
        let store = Arc::new(SessionStore::new());
        let key = store.put(new_session()).unwrap();
        let sweeper = store.spawn_sweeper(SWEEP_INTERVAL);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.len(), 1);
        tokio::time::sleep(Duration::from_secs(64)).await;
        assert_eq!(store.len(), 0);
        assert!(store.get(&key).is_err());

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_sweeper_no_longer_evicts() {
        let store = Arc::new(SessionStore::new());
        let sweeper = store.spawn_sweeper(SWEEP_INTERVAL);
        sweeper.stop().await;
        store.put(new_session()).unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(store.len(), 1);
    }
}
