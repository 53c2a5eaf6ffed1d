//! Generic scoped cache over an [`EntityStore`].
//!
//! A cache mirrors the rows of one table within one scope. It fetches on
//! scope change, follows the scope's change feed, and re-fetches after every
//! write it issues. Store failures never escape: they become notices and
//! the operation returns `None` or `false`.
//!
//! Consistency rests on two stamps:
//!
//! - the scope generation, bumped on every scope change; fetches and events
//!   issued under an older generation are dropped
//! - the store revision; the cache remembers the highest revision it has
//!   applied and drops events at or below it, as well as fetches taken
//!   before it

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::NoticeSink;
use crate::store::{sort_rows, ChangeEvent, ChangeKind, Entity, EntityStore};
use crate::validation::ValidationError;

struct CacheState<E> {
    scope: Option<Uuid>,
    generation: u64,
    rows: Vec<E>,
    loaded: bool,
    /// Highest store revision reflected in `rows`.
    watermark: u64,
    fetch_seq: u64,
    applied_seq: u64,
    /// Queries issued and not yet answered, across generations.
    in_flight: usize,
    /// Events received before the first fetch of the scope landed.
    pending: Vec<ChangeEvent>,
}

enum Merge {
    Applied,
    Skipped,
    Refetch,
}

impl<E: Entity> CacheState<E> {
    fn new() -> Self {
        Self {
            scope: None,
            generation: 0,
            rows: Vec::new(),
            loaded: false,
            watermark: 0,
            fetch_seq: 0,
            applied_seq: 0,
            in_flight: 0,
            pending: Vec::new(),
        }
    }

    fn apply_event(&mut self, event: ChangeEvent) -> Merge {
        if event.kind == ChangeKind::Resync {
            return Merge::Refetch;
        }
        if event.revision <= self.watermark {
            return Merge::Skipped;
        }

        match event.kind {
            ChangeKind::Delete => self.rows.retain(|r| r.id() != event.id),
            _ => {
                let Some(row) = event
                    .row
                    .and_then(|value| serde_json::from_value::<E>(value).ok())
                else {
                    return Merge::Refetch;
                };
                self.rows.retain(|r| r.id() != row.id());
                if Some(row.scope_id()) == self.scope {
                    self.rows.push(row);
                }
                sort_rows(&mut self.rows);
            }
        }

        self.watermark = event.revision;
        Merge::Applied
    }
}

struct Inner<E: Entity> {
    store: Arc<dyn EntityStore<E>>,
    state: RwLock<CacheState<E>>,
    notices: NoticeSink,
    version: watch::Sender<u64>,
}

impl<E: Entity> Inner<E> {
    fn touch(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    async fn handle_event(&self, generation: u64, event: ChangeEvent) {
        if event.table != E::TABLE {
            return;
        }

        let refetch = {
            let mut state = self.state.write().await;
            if state.generation != generation || state.scope != Some(event.scope) {
                return;
            }
            if event.kind == ChangeKind::Resync {
                true
            } else if !state.loaded {
                // Without a fetch on the way the event would wait forever.
                state.pending.push(event);
                state.in_flight == 0
            } else {
                let merge = state.apply_event(event);
                drop(state);
                match merge {
                    Merge::Applied => {
                        self.touch();
                        false
                    }
                    Merge::Skipped => false,
                    Merge::Refetch => true,
                }
            }
        };

        if refetch {
            self.refresh().await;
        }
    }

    /// Fetches the current scope. Returns false when the query failed.
    async fn refresh(&self) -> bool {
        loop {
            let (scope, generation, seq) = {
                let mut state = self.state.write().await;
                let Some(scope) = state.scope else {
                    return true;
                };
                state.fetch_seq += 1;
                state.in_flight += 1;
                (scope, state.generation, state.fetch_seq)
            };

            let result = self.store.query(scope).await;

            let mut state = self.state.write().await;
            state.in_flight -= 1;
            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    if state.in_flight == 0 {
                        state.pending.clear();
                    }
                    if state.generation == generation {
                        drop(state);
                        self.notices
                            .error(format!("Failed to load {}: {}", E::TABLE, e));
                    } else {
                        tracing::debug!(
                            "Dropping {} fetch error for abandoned scope {}",
                            E::TABLE,
                            scope
                        );
                    }
                    return false;
                }
            };

            if state.generation != generation {
                tracing::debug!("Discarding {} fetch for abandoned scope {}", E::TABLE, scope);
                return true;
            }
            if seq < state.applied_seq || (state.loaded && snapshot.revision < state.watermark) {
                tracing::debug!(
                    "Discarding stale {} fetch at revision {}",
                    E::TABLE,
                    snapshot.revision
                );
                return true;
            }

            state.rows = snapshot.rows;
            sort_rows(&mut state.rows);
            state.watermark = snapshot.revision;
            state.applied_seq = seq;

            let mut refetch = false;
            if !state.loaded {
                state.loaded = true;
                for event in std::mem::take(&mut state.pending) {
                    if let Merge::Refetch = state.apply_event(event) {
                        refetch = true;
                    }
                }
            }
            drop(state);
            self.touch();

            if !refetch {
                return true;
            }
        }
    }
}

/// Ordered in-memory mirror of one table slice.
pub struct SyncCache<E: Entity> {
    inner: Arc<Inner<E>>,
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Entity> SyncCache<E> {
    pub fn new(store: Arc<dyn EntityStore<E>>, notices: NoticeSink) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                store,
                state: RwLock::new(CacheState::new()),
                notices,
                version,
            }),
            subscription: Mutex::new(None),
        }
    }

    pub fn notices(&self) -> &NoticeSink {
        &self.inner.notices
    }

    pub fn store(&self) -> &Arc<dyn EntityStore<E>> {
        &self.inner.store
    }

    /// Switches the cache to `scope`, dropping the previous subscription.
    ///
    /// With `None` the cache is cleared and no query is issued. Returns
    /// false if the initial fetch failed.
    pub async fn set_scope(&self, scope: Option<Uuid>) -> bool {
        let mut subscription = self.subscription.lock().await;
        if let Some(handle) = subscription.take() {
            handle.abort();
        }

        let generation = {
            let mut state = self.inner.state.write().await;
            state.scope = scope;
            state.generation += 1;
            state.rows.clear();
            state.loaded = false;
            state.watermark = 0;
            state.pending.clear();
            state.generation
        };
        self.inner.touch();

        let Some(scope) = scope else {
            return true;
        };

        match self.inner.store.subscribe(scope).await {
            Ok(mut changes) => {
                let inner = Arc::clone(&self.inner);
                *subscription = Some(tokio::spawn(async move {
                    while let Some(event) = changes.next().await {
                        inner.handle_event(generation, event).await;
                    }
                    tracing::debug!("Change feed for {}/{} ended", E::TABLE, scope);
                }));
            }
            Err(e) => self
                .inner
                .notices
                .error(format!("Failed to subscribe to {}: {}", E::TABLE, e)),
        }
        drop(subscription);

        self.inner.refresh().await
    }

    pub async fn scope(&self) -> Option<Uuid> {
        self.inner.state.read().await.scope
    }

    /// True once the first fetch of the current scope has landed.
    pub async fn is_loaded(&self) -> bool {
        self.inner.state.read().await.loaded
    }

    pub async fn rows(&self) -> Vec<E> {
        self.inner.state.read().await.rows.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<E> {
        self.inner
            .state
            .read()
            .await
            .rows
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// Receiver that ticks whenever the cached rows may have changed.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    pub async fn refresh(&self) -> bool {
        self.inner.refresh().await
    }

    pub async fn create(&self, new: E::New) -> Option<E> {
        let (scope, siblings) = {
            let state = self.inner.state.read().await;
            (state.scope, state.rows.clone())
        };
        let Some(scope) = scope else {
            self.inner
                .notices
                .error(ValidationError::MissingContext(E::TABLE.scope_name()).to_string());
            return None;
        };
        if let Err(e) = E::create(scope, new.clone(), &siblings) {
            self.inner.notices.error(e.to_string());
            return None;
        }

        let created = match self.inner.store.insert(scope, new).await {
            Ok(row) => Some(row),
            Err(e) => {
                self.inner
                    .notices
                    .error(format!("Failed to create {}: {}", E::TABLE.singular(), e));
                None
            }
        };

        self.inner.refresh().await;
        created
    }

    pub async fn update(&self, id: Uuid, patch: E::Patch) -> Option<E> {
        {
            let state = self.inner.state.read().await;
            let Some(current) = state.rows.iter().find(|r| r.id() == id) else {
                drop(state);
                self.not_cached(id);
                return None;
            };
            if let Err(e) = current.check_patch(&patch, &state.rows) {
                drop(state);
                self.inner.notices.error(e.to_string());
                return None;
            }
        }

        self.write_update(id, patch).await
    }

    /// Applies `patch` to the cached row before the write goes out. A failed
    /// write is reverted by the closing re-fetch.
    pub async fn update_optimistic(&self, id: Uuid, patch: E::Patch) -> Option<E> {
        {
            let mut state = self.inner.state.write().await;
            let Some(index) = state.rows.iter().position(|r| r.id() == id) else {
                drop(state);
                self.not_cached(id);
                return None;
            };
            if let Err(e) = state.rows[index].check_patch(&patch, &state.rows) {
                drop(state);
                self.inner.notices.error(e.to_string());
                return None;
            }
            state.rows[index].apply_patch(&patch);
            sort_rows(&mut state.rows);
        }
        self.inner.touch();

        self.write_update(id, patch).await
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        let deleted = match self.inner.store.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                self.inner
                    .notices
                    .error(format!("Failed to delete {}: {}", E::TABLE.singular(), e));
                false
            }
        };

        self.inner.refresh().await;
        deleted
    }

    async fn write_update(&self, id: Uuid, patch: E::Patch) -> Option<E> {
        let updated = match self.inner.store.update(id, patch).await {
            Ok(row) => Some(row),
            Err(e) => {
                self.inner
                    .notices
                    .error(format!("Failed to update {}: {}", E::TABLE.singular(), e));
                None
            }
        };

        self.inner.refresh().await;
        updated
    }

    fn not_cached(&self, id: Uuid) {
        self.inner
            .notices
            .error(format!("{} {} not found", E::TABLE.singular(), id));
    }
}

impl<E: Entity> Drop for SyncCache<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.subscription.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Waits until the cached rows satisfy `condition`.
    pub async fn wait_until<E: Entity>(cache: &SyncCache<E>, condition: impl Fn(&[E]) -> bool) {
        let mut updates = cache.updates();
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if condition(&cache.rows().await) {
                    return;
                }
                if updates.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        assert!(result.is_ok(), "cache never reached the expected state");
    }
}
