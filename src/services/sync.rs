//! Snapshot client: keeps a view's marker state in sync with the server.
//!
//! Every `request` bumps a generation counter and cancels the token of the
//! request before it. Fetches run on their own threads; when one finishes it
//! may only commit if its generation is still the current one, checked under
//! the state lock. A stale response is dropped no matter when it arrives.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::client::{CancelToken, FetchError, SnapshotTransport};
use crate::filter::DeviceFilter;
use crate::models::snapshot::SensorView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct SnapshotState {
    pub phase: Phase,
    /// Markers from the last successful response, unfiltered.
    pub markers: Vec<SensorView>,
    pub error: Option<String>,
    pub filter: DeviceFilter,
}

impl SnapshotState {
    fn new() -> Self {
        SnapshotState {
            phase: Phase::Idle,
            markers: Vec::new(),
            error: None,
            filter: DeviceFilter::all(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    /// Markers the view should render: the last payload passed through the
    /// current filter once more on this side.
    pub fn visible_markers(&self) -> Vec<SensorView> {
        self.filter.visible(&self.markers)
    }

    /// Leave `Loading` once nothing is in flight any more.
    fn settle_pending(&mut self) {
        if self.phase == Phase::Loading {
            self.phase = if self.markers.is_empty() { Phase::Idle } else { Phase::Success };
        }
    }
}

struct Inner {
    state: SnapshotState,
    generation: u64,
    in_flight: Option<CancelToken>,
    /// Filter of the last request that actually committed a result.
    committed: Option<DeviceFilter>,
}

pub struct SnapshotClient<T: SnapshotTransport + 'static> {
    transport: Arc<T>,
    inner: Arc<Mutex<Inner>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: SnapshotTransport + 'static> SnapshotClient<T> {
    pub fn new(transport: T) -> Self {
        SnapshotClient {
            transport: Arc::new(transport),
            inner: Arc::new(Mutex::new(Inner {
                state: SnapshotState::new(),
                generation: 0,
                in_flight: None,
                committed: None,
            })),
            workers: Vec::new(),
        }
    }

    /// Issue a request for `filter`, superseding whatever is in flight.
    /// Returns the generation assigned to the new request.
    pub fn request(&mut self, filter: DeviceFilter) -> u64 {
        self.reap_finished();

        let token = CancelToken::new();
        let generation = {
            let mut inner = lock(&self.inner);
            if let Some(previous) = inner.in_flight.replace(token.clone()) {
                previous.cancel();
            }
            inner.generation += 1;
            inner.state.phase = Phase::Loading;
            inner.state.error = None;
            inner.state.filter = filter.clone();
            inner.generation
        };
        debug!("Snapshot request #{} issued (filter={})", generation, filter);

        let transport = Arc::clone(&self.transport);
        let shared = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(format!("snapshot-fetch-{generation}"))
            .spawn(move || {
                let result = transport.fetch(&filter, &token);
                commit(&shared, generation, &token, result);
            });
        match handle {
            Ok(h) => self.workers.push(h),
            Err(e) => {
                let failure = Err(FetchError::Transport(format!("could not spawn fetch worker: {}", e)));
                let token = lock(&self.inner).in_flight.clone().unwrap_or_default();
                commit(&self.inner, generation, &token, failure);
            }
        }
        generation
    }

    /// Request only if `filter` is neither in flight nor already answered.
    /// Returns whether a request was issued.
    pub fn set_filter(&mut self, filter: DeviceFilter) -> bool {
        let unchanged = {
            let inner = lock(&self.inner);
            inner.state.filter == filter
                && (inner.in_flight.is_some() || inner.committed.as_ref() == Some(&filter))
        };
        if unchanged {
            return false;
        }
        self.request(filter);
        true
    }

    /// Re-issue the current filter.
    pub fn refresh(&mut self) -> u64 {
        let filter = lock(&self.inner).state.filter.clone();
        self.request(filter)
    }

    /// Cancel the in-flight request, as when the consuming view goes away.
    /// Markers and error are left as they were; only a pending `Loading`
    /// settles back, since nothing is in flight any more.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        if let Some(token) = inner.in_flight.take() {
            token.cancel();
        }
        inner.state.settle_pending();
    }

    pub fn state(&self) -> SnapshotState {
        lock(&self.inner).state.clone()
    }

    pub fn visible_markers(&self) -> Vec<SensorView> {
        lock(&self.inner).state.visible_markers()
    }

    /// Block until every spawned fetch has returned, committed or not.
    pub fn settle(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Snapshot fetch worker panicked");
            }
        }
    }

    fn reap_finished(&mut self) {
        self.workers.retain(|h| !h.is_finished());
    }
}

impl<T: SnapshotTransport + 'static> Drop for SnapshotClient<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A poisoned lock only means a worker panicked mid-commit; the state is
    // still a whole value, so keep going.
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn commit(shared: &Mutex<Inner>, generation: u64, token: &CancelToken, result: Result<Vec<SensorView>, FetchError>) {
    let mut inner = lock(shared);
    if token.is_cancelled() || inner.generation != generation {
        debug!(
            "Discarding response for superseded request #{} (current #{})",
            generation, inner.generation
        );
        return;
    }
    inner.in_flight = None;
    if !matches!(result, Err(FetchError::Canceled)) {
        inner.committed = Some(inner.state.filter.clone());
    }

    match result {
        Ok(markers) => {
            debug!("Snapshot request #{} succeeded with {} marker(s)", generation, markers.len());
            inner.state.markers = markers;
            inner.state.error = None;
            inner.state.phase = Phase::Success;
        }
        Err(FetchError::Canceled) => {
            debug!("Snapshot request #{} was canceled by its transport", generation);
            inner.state.settle_pending();
        }
        Err(e) => {
            warn!("Snapshot request #{} failed: {}", generation, e);
            inner.state.error = Some(e.to_string());
            inner.state.phase = Phase::Error;
        }
    }
}
