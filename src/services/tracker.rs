use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::SessionStore,
    error::{AppError, AppResult},
    models::{
        ComparisonEvent, FavoriteAction, InteractionEvent, InteractionKind, ProductId, ProductView,
        SearchEvent, UserBehaviorSnapshot, ViewSource,
    },
    services::clock::Clock,
};

/// Clicks are attributed to a search only this long after it happened
pub const SEARCH_CLICK_WINDOW_SECS: i64 = 5 * 60;

const MIN_COMPARISON_SIZE: usize = 2;
const MAX_COMPARISON_SIZE: usize = 5;

/// A product view that has started but not yet ended
#[derive(Debug, Clone)]
struct OpenView {
    product_id: ProductId,
    source: ViewSource,
    started_at: DateTime<Utc>,
    scroll_depth: u8,
}

/// Session-scoped owner of one visitor's behavior snapshot.
///
/// The tracker is the only thing that mutates its snapshot. It does no locking
/// of its own; callers sharing it across tasks wrap it in a mutex (see
/// `SessionRegistry`). Persistence is best-effort: store failures are logged and
/// the in-memory snapshot stays authoritative.
///
/// At most one product view is open at a time. Opening a view always completes
/// the previous one first, and a view parked by `on_suspend` is only reopened
/// by `on_resume` if nothing else has been viewed in between.
pub struct BehaviorTracker {
    session_key: String,
    snapshot: UserBehaviorSnapshot,
    open_view: Option<OpenView>,
    suspended_view: Option<(ProductId, ViewSource)>,
    // Snapshot changed since the last successful save
    dirty: bool,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl BehaviorTracker {
    /// Starts tracking a session, resuming any snapshot persisted under `session_key`.
    ///
    /// A resumed snapshot keeps its history but gets a fresh `session_id`.
    pub async fn resume(
        session_key: impl Into<String>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session_key = session_key.into();

        let snapshot = match store.load(&session_key).await {
            Ok(Some(mut snapshot)) => {
                snapshot.session_id = Uuid::new_v4();
                tracing::info!(
                    session_key = %session_key,
                    session_id = %snapshot.session_id,
                    views = snapshot.product_views.len(),
                    interactions = snapshot.interactions.len(),
                    "Resumed behavior snapshot"
                );
                snapshot
            }
            Ok(None) => UserBehaviorSnapshot::new(),
            Err(e) => {
                tracing::warn!(
                    session_key = %session_key,
                    store = store.name(),
                    error = %e,
                    "Failed to load behavior snapshot, starting empty"
                );
                UserBehaviorSnapshot::new()
            }
        };

        Self {
            session_key,
            snapshot,
            open_view: None,
            suspended_view: None,
            dirty: false,
            store,
            clock,
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn snapshot(&self) -> &UserBehaviorSnapshot {
        &self.snapshot
    }

    /// Product currently being viewed, if any
    pub fn open_view(&self) -> Option<ProductId> {
        self.open_view.as_ref().map(|v| v.product_id)
    }

    /// Opens a view of `product_id`, closing any view that is still open.
    ///
    /// The view is only written to `product_views` when it closes, with its
    /// duration and scroll depth. A view parked by `on_suspend` is forgotten:
    /// the visitor has moved on, so `on_resume` will not bring it back.
    pub fn track_product_view(&mut self, product_id: ProductId, source: ViewSource) {
        self.close_open_view();
        self.suspended_view = None;

        let now = self.clock.now();
        self.open_view = Some(OpenView {
            product_id,
            source,
            started_at: now,
            scroll_depth: 0,
        });
        self.record(
            InteractionKind::Generic("click".to_string()),
            product_id.to_string(),
            HashMap::from([("source".to_string(), json!(source.to_string()))]),
        );
    }

    /// Records how far the open view has been scrolled; ignored when no view is open
    pub fn update_scroll_depth(&mut self, percent: u8) {
        if let Some(view) = self.open_view.as_mut() {
            view.scroll_depth = percent.min(100);
        }
    }

    /// Completes the open view, if any, and returns the recorded view
    fn close_open_view(&mut self) -> Option<ProductView> {
        let view = self.open_view.take()?;
        let now = self.clock.now();
        let duration_seconds = ((now - view.started_at).num_milliseconds().max(0)) as f64 / 1000.0;

        let completed = ProductView {
            product_id: view.product_id,
            timestamp: view.started_at,
            duration_seconds,
            source: view.source,
            scroll_depth_percent: view.scroll_depth,
        };

        self.snapshot.product_views.push(completed.clone());
        *self
            .snapshot
            .time_spent_by_product
            .entry(view.product_id)
            .or_insert(0.0) += duration_seconds;
        self.record(
            InteractionKind::ViewEnd,
            view.product_id.to_string(),
            HashMap::from([
                ("duration_seconds".to_string(), json!(duration_seconds)),
                ("scroll_depth".to_string(), json!(view.scroll_depth)),
            ]),
        );

        Some(completed)
    }

    /// Records a search. The query is trimmed and lowercased before it is stored,
    /// so repeated searches compare equal in the prompt summary.
    pub fn track_search(&mut self, query: &str, results_shown: u32) {
        let query = query.trim().to_lowercase();
        let now = self.clock.now();

        self.snapshot.searches.push(SearchEvent {
            query: query.clone(),
            timestamp: now,
            results_shown,
            clicked_results: Vec::new(),
        });
        self.record(
            InteractionKind::Search,
            query,
            HashMap::from([("results_shown".to_string(), json!(results_shown))]),
        );
    }

    /// Attributes a click to the newest search if it happened within the
    /// attribution window. Returns whether the click was attributed.
    pub fn track_search_click(&mut self, product_id: ProductId) -> bool {
        let now = self.clock.now();
        let window = Duration::seconds(SEARCH_CLICK_WINDOW_SECS);

        let attributed = match self.snapshot.searches.last_mut() {
            Some(search) if now - search.timestamp <= window => {
                search.clicked_results.push(product_id);
                true
            }
            _ => false,
        };

        self.record(
            InteractionKind::SearchClick,
            product_id.to_string(),
            HashMap::from([("attributed".to_string(), json!(attributed))]),
        );
        attributed
    }

    /// Starts a comparison of 2-5 distinct products.
    ///
    /// Duplicate ids collapse before the size check, so `[a, a]` is a
    /// comparison of one product and is rejected. The comparison stays open,
    /// with a zero duration, until `end_comparison` is called with the same set.
    pub fn track_comparison(&mut self, product_ids: &[ProductId]) -> AppResult<()> {
        let ids: BTreeSet<ProductId> = product_ids.iter().copied().collect();
        if !(MIN_COMPARISON_SIZE..=MAX_COMPARISON_SIZE).contains(&ids.len()) {
            return Err(AppError::InvalidInput(format!(
                "A comparison needs between {} and {} distinct products, got {}",
                MIN_COMPARISON_SIZE,
                MAX_COMPARISON_SIZE,
                ids.len()
            )));
        }

        let target = join_ids(&ids);
        self.snapshot.comparisons.push(ComparisonEvent {
            product_ids: ids,
            timestamp: self.clock.now(),
            duration_seconds: 0.0,
            ended_at: None,
        });
        self.record(InteractionKind::Compare, target, HashMap::new());
        Ok(())
    }

    /// Closes the newest still-open comparison of exactly these products.
    /// Returns its duration, or `None` when no such comparison is open.
    pub fn end_comparison(&mut self, product_ids: &[ProductId]) -> Option<f64> {
        let ids: BTreeSet<ProductId> = product_ids.iter().copied().collect();
        let now = self.clock.now();

        let comparison = self
            .snapshot
            .comparisons
            .iter_mut()
            .rev()
            .find(|c| c.product_ids == ids && c.ended_at.is_none())?;

        comparison.duration_seconds =
            ((now - comparison.timestamp).num_milliseconds().max(0)) as f64 / 1000.0;
        comparison.ended_at = Some(now);
        let duration_seconds = comparison.duration_seconds;
        self.dirty = true;
        Some(duration_seconds)
    }

    /// Adds or removes a favorite. Both directions are idempotent on the set but
    /// every call is logged as an interaction.
    pub fn track_favorite(&mut self, product_id: ProductId, action: FavoriteAction) {
        match action {
            FavoriteAction::Add => {
                self.snapshot.favorites.insert(product_id);
            }
            FavoriteAction::Remove => {
                self.snapshot.favorites.remove(&product_id);
            }
        }

        let action = match action {
            FavoriteAction::Add => "add",
            FavoriteAction::Remove => "remove",
        };
        self.record(
            InteractionKind::Favorite,
            product_id.to_string(),
            HashMap::from([("action".to_string(), json!(action))]),
        );
    }

    /// Logs a host-reported interaction
    pub fn track_interaction(
        &mut self,
        kind: InteractionKind,
        target: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        self.record(kind, target.into(), metadata);
    }

    fn record(
        &mut self,
        kind: InteractionKind,
        target: String,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let event = InteractionEvent {
            kind,
            target,
            timestamp: self.clock.now(),
            metadata,
        };
        self.snapshot.push_interaction(event);
        self.dirty = true;
    }

    /// Whether the snapshot changed since it was last persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mirrors the snapshot to the session store. Never fails.
    ///
    /// A failed save is logged and leaves the tracker dirty, so the next
    /// periodic flush tries again.
    pub async fn flush(&mut self) {
        match self.store.save(&self.session_key, &self.snapshot).await {
            Ok(()) => self.dirty = false,
            Err(e) => {
                tracing::warn!(
                    session_key = %self.session_key,
                    store = self.store.name(),
                    error = %e,
                    "Failed to persist behavior snapshot"
                );
            }
        }
    }

    /// The host went to the background: close the open view and persist
    pub async fn on_suspend(&mut self) {
        if let Some(view) = self.close_open_view() {
            self.suspended_view = Some((view.product_id, view.source));
        }
        self.flush().await;
    }

    /// The host came back: reopen the view that was open at suspension.
    ///
    /// Does nothing while another view is open; that view stays the open one.
    pub fn on_resume(&mut self) {
        if self.open_view.is_some() {
            self.suspended_view = None;
            return;
        }
        if let Some((product_id, source)) = self.suspended_view.take() {
            self.open_view = Some(OpenView {
                product_id,
                source,
                started_at: self.clock.now(),
                scroll_depth: 0,
            });
            self.record(
                InteractionKind::ViewStart,
                product_id.to_string(),
                HashMap::from([("resumed".to_string(), json!(true))]),
            );
        }
    }

    /// Session teardown: close the open view and persist
    pub async fn shutdown(&mut self) {
        self.close_open_view();
        self.suspended_view = None;
        self.flush().await;
    }

    /// Forgets all tracked behavior for this session
    pub async fn clear_behavior(&mut self) {
        let session_id = self.snapshot.session_id;
        self.snapshot = UserBehaviorSnapshot::new();
        self.snapshot.session_id = session_id;
        self.open_view = None;
        self.suspended_view = None;
        self.flush().await;

        tracing::info!(session_key = %self.session_key, "Cleared behavior snapshot");
    }
}

fn join_ids(ids: &BTreeSet<ProductId>) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
