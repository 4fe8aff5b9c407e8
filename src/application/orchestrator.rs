// Chart orchestrator - per-chart registry, load status and filter-driven re-fetching
use crate::application::error::BackendError;
use crate::application::filter_builder::build_query;
use crate::application::filter_store::FilterStore;
use crate::application::query_backend::{ExecRequest, QueryBackend};
use crate::application::series_transformer::SeriesTransformer;
use crate::application::template::MissingParam;
use crate::domain::chart::{ChartData, ChartEvent, ChartKind, ChartStatus, ChartSummary, ChartView};
use crate::domain::filter::FilterSnapshot;
use crate::domain::query::QueryTarget;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

const EVENT_CAPACITY: usize = 256;

/// Result of one fetch trigger for a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Status moved to `Loading` and a fetch was spawned.
    Started,
    /// A fetch is already in flight; the trigger was dropped.
    AlreadyLoading,
    /// No target has a database, nothing was sent.
    NoRunnableTargets,
    /// The chart is not registered.
    Unknown,
}

struct ChartEntry {
    targets: Vec<QueryTarget>,
    kind: ChartKind,
    generation: u64,
    status: ChartStatus,
    filter_version: u64,
    dropped_triggers: u64,
    data: Option<ChartData>,
    error: Option<String>,
    subscription: Option<AbortHandle>,
}

impl ChartEntry {
    fn view(&self, id: &str) -> ChartView {
        ChartView {
            id: id.to_string(),
            kind: self.kind,
            status: self.status,
            filter_version: self.filter_version,
            dropped_triggers: self.dropped_triggers,
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

struct Inner {
    backend: Arc<dyn QueryBackend>,
    filters: FilterStore,
    transformer: SeriesTransformer,
    missing_param: MissingParam,
    charts: Mutex<HashMap<String, ChartEntry>>,
    events: broadcast::Sender<ChartEvent>,
    generations: AtomicU64,
}

/// Keeps every registered chart in step with the filter state.
///
/// Each chart owns a subscription task that fetches once on registration and again on
/// every new filter version. A chart has at most one fetch in flight: triggers that
/// arrive while it is `Loading` are dropped, so a slow backend can leave a chart showing
/// the result for an older filter version until the next change.
#[derive(Clone)]
pub struct ChartOrchestrator {
    inner: Arc<Inner>,
}

impl ChartOrchestrator {
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        filters: FilterStore,
        transformer: SeriesTransformer,
        missing_param: MissingParam,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                filters,
                transformer,
                missing_param,
                charts: Mutex::new(HashMap::new()),
                events,
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn filters(&self) -> &FilterStore {
        &self.inner.filters
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChartEvent> {
        self.inner.events.subscribe()
    }

    /// Register a chart. Returns `false` and changes nothing if the id is already present.
    pub fn register(&self, id: &str, targets: Vec<QueryTarget>, kind: ChartKind) -> bool {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut charts = self.inner.lock();
            if charts.contains_key(id) {
                tracing::debug!(chart_id = id, "chart already registered, ignoring");
                return false;
            }
            charts.insert(
                id.to_string(),
                ChartEntry {
                    targets,
                    kind,
                    generation,
                    status: ChartStatus::Init,
                    filter_version: 0,
                    dropped_triggers: 0,
                    data: None,
                    error: None,
                    subscription: None,
                },
            );
        }

        let task = tokio::spawn(watch_filters(
            Arc::downgrade(&self.inner),
            id.to_string(),
            generation,
        ));
        let handle = task.abort_handle();

        let mut charts = self.inner.lock();
        match charts.get_mut(id).filter(|e| e.generation == generation) {
            Some(entry) => entry.subscription = Some(handle),
            None => handle.abort(),
        }
        tracing::info!(chart_id = id, generation, "chart registered");
        true
    }

    /// Drop all state for a chart and stop its subscription. Returns `false` if it was not
    /// registered. A fetch still in flight completes into the void.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.inner.lock().remove(id);
        match removed {
            Some(entry) => {
                if let Some(handle) = entry.subscription {
                    handle.abort();
                }
                tracing::info!(chart_id = id, "chart unregistered");
                true
            }
            None => false,
        }
    }

    /// Fetch a chart now against the current filter state.
    pub fn refresh(&self, id: &str) -> Dispatch {
        let snapshot = self.inner.filters.snapshot();
        self.inner.dispatch(id, None, &snapshot)
    }

    pub fn refresh_all(&self) -> Vec<(String, Dispatch)> {
        let snapshot = self.inner.filters.snapshot();
        let ids: Vec<String> = self.inner.lock().keys().cloned().collect();
        ids.into_iter()
            .map(|id| {
                let outcome = self.inner.dispatch(&id, None, &snapshot);
                (id, outcome)
            })
            .collect()
    }

    pub fn status(&self, id: &str) -> Option<ChartStatus> {
        self.inner.lock().get(id).map(|e| e.status)
    }

    pub fn view(&self, id: &str) -> Option<ChartView> {
        self.inner.lock().get(id).map(|e| e.view(id))
    }

    pub fn targets(&self, id: &str) -> Option<Vec<QueryTarget>> {
        self.inner.lock().get(id).map(|e| e.targets.clone())
    }

    pub fn list(&self) -> Vec<ChartSummary> {
        let mut charts: Vec<ChartSummary> = self
            .inner
            .lock()
            .iter()
            .map(|(id, e)| ChartSummary {
                id: id.clone(),
                status: e.status,
                filter_version: e.filter_version,
            })
            .collect();
        charts.sort_by(|a, b| a.id.cmp(&b.id));
        charts
    }

    /// Unregister every chart.
    pub fn shutdown(&self) {
        let drained: Vec<ChartEntry> = self.inner.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            if let Some(handle) = entry.subscription {
                handle.abort();
            }
        }
    }
}

async fn watch_filters(inner: Weak<Inner>, id: String, generation: u64) {
    let Some(mut rx) = inner.upgrade().map(|i| i.filters.subscribe()) else {
        return;
    };

    loop {
        let snapshot = rx.borrow_and_update().clone();
        match inner.upgrade() {
            Some(inner) => {
                if inner.dispatch(&id, Some(generation), &snapshot) == Dispatch::Unknown {
                    return;
                }
            }
            None => return,
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChartEntry>> {
        self.charts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, id: &str, generation: Option<u64>, snapshot: &FilterSnapshot) -> Dispatch {
        let (requests, kind, generation) = {
            let mut charts = self.lock();
            let Some(entry) = charts
                .get_mut(id)
                .filter(|e| generation.is_none_or(|g| g == e.generation))
            else {
                return Dispatch::Unknown;
            };

            if entry.status == ChartStatus::Loading {
                entry.dropped_triggers += 1;
                tracing::debug!(
                    chart_id = id,
                    filter_version = snapshot.version,
                    "fetch in flight, trigger dropped"
                );
                return Dispatch::AlreadyLoading;
            }

            let requests: Vec<ExecRequest> = entry
                .targets
                .iter()
                .filter_map(|target| {
                    let db = target.database()?;
                    Some(ExecRequest {
                        sql: build_query(target, &snapshot.params, self.missing_param),
                        db: Some(db.to_string()),
                    })
                })
                .collect();
            if requests.is_empty() {
                tracing::debug!(chart_id = id, "no target with a database, skipping fetch");
                return Dispatch::NoRunnableTargets;
            }

            entry.status = ChartStatus::Loading;
            entry.filter_version = snapshot.version;
            self.publish(id, entry);
            (requests, entry.kind, entry.generation)
        };

        tokio::spawn(supervise_fetch(self.clone(), id.to_string(), generation, requests, kind));
        Dispatch::Started
    }

    fn complete(&self, id: &str, generation: u64, outcome: Result<Option<ChartData>, String>) {
        let mut charts = self.lock();
        let Some(entry) = charts.get_mut(id).filter(|e| e.generation == generation) else {
            tracing::debug!(chart_id = id, "chart gone before fetch completed, result discarded");
            return;
        };

        match outcome {
            Ok(Some(data)) => {
                entry.status = ChartStatus::Ok;
                entry.data = Some(data);
                entry.error = None;
            }
            Ok(None) => {
                entry.status = ChartStatus::Empty;
                entry.data = None;
                entry.error = None;
            }
            Err(message) => {
                tracing::warn!(chart_id = id, error = %message, "chart fetch failed");
                entry.status = ChartStatus::Error;
                entry.error = Some(message);
            }
        }
        tracing::debug!(chart_id = id, status = ?entry.status, "chart fetch settled");
        self.publish(id, entry);
    }

    fn publish(&self, id: &str, entry: &ChartEntry) {
        let event = ChartEvent {
            chart_id: id.to_string(),
            status: entry.status,
            filter_version: entry.filter_version,
            data: match entry.status {
                ChartStatus::Ok => entry.data.clone(),
                _ => None,
            },
            error: match entry.status {
                ChartStatus::Error => entry.error.clone(),
                _ => None,
            },
        };
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

/// Runs the fetch in its own task so a panic in the backend or the transformer still
/// settles the chart instead of leaving it `Loading`.
async fn supervise_fetch(
    inner: Arc<Inner>,
    id: String,
    generation: u64,
    requests: Vec<ExecRequest>,
    kind: ChartKind,
) {
    tracing::debug!(chart_id = %id, queries = requests.len(), "fetching chart");
    let outcome = match tokio::spawn(fetch(inner.clone(), requests, kind)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(chart_id = %id, error = %e, "chart fetch task died");
            Err(format!("fetch task failed: {}", e))
        }
    };
    inner.complete(&id, generation, outcome);
}

async fn fetch(
    inner: Arc<Inner>,
    requests: Vec<ExecRequest>,
    kind: ChartKind,
) -> Result<Option<ChartData>, String> {
    let responses = join_all(requests.iter().map(|r| inner.backend.exec(r))).await;

    let mut results = Vec::with_capacity(responses.len());
    for response in responses {
        match response {
            Ok(rs) => results.push(rs),
            Err(BackendError::NotFound) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
    inner.transformer.transform(&results, kind).map_err(|e| e.to_string())
}
