//! Per-region occlusion visibility for screen-space labels.
//!
//! [`OcclusionTracker`] owns the query bookkeeping and knows nothing about the
//! GPU: it plans [`QueryBatch`]es and folds [`BatchResult`]s back into cached
//! visibility. [`gpu::GpuOcclusionQueries`] executes batches as wgpu occlusion
//! queries against the main pass depth buffer.

use std::collections::HashMap;

use cgmath::Point3;

use crate::region::RegionId;

pub mod gpu;

/// Default frame interval for [`OcclusionMode::Realtime`].
pub const DEFAULT_REALTIME_INTERVAL: u64 = 3;

/// When occlusion queries are allowed to run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OcclusionMode {
    /// Only while the camera is stopped.
    #[default]
    Smooth,
    /// Only while the camera is moving, every Nth frame.
    Realtime,
}

/// One point query.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QueryRequest {
    pub id: RegionId,
    pub position: Point3<f32>,
}

/// Queries issued together in one frame. Results come back as a [`BatchResult`]
/// with the same `batch` number, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    pub batch: u64,
    pub queries: Vec<QueryRequest>,
}

/// Answers for a [`QueryBatch`]. `None` means the read-back failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub batch: u64,
    pub visible: Option<Vec<bool>>,
}

#[derive(Debug, Copy, Clone)]
struct RegionQueryState {
    visible: bool,
    in_flight: Option<u64>,
}

impl Default for RegionQueryState {
    fn default() -> Self {
        // Optimistic: a region with no answer yet is visible.
        Self { visible: true, in_flight: None }
    }
}

/// Query bookkeeping keyed by region id.
#[derive(Debug)]
pub struct OcclusionTracker {
    mode: OcclusionMode,
    realtime_interval: u64,
    states: HashMap<RegionId, RegionQueryState>,
    batches: HashMap<u64, Vec<RegionId>>,
    next_batch: u64,
}

impl OcclusionTracker {
    pub fn new(mode: OcclusionMode, realtime_interval: u64) -> Self {
        Self {
            mode,
            realtime_interval: realtime_interval.max(1),
            states: HashMap::new(),
            batches: HashMap::new(),
            next_batch: 0,
        }
    }

    pub fn mode(&self) -> OcclusionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OcclusionMode) {
        self.mode = mode;
    }

    /// Throttle: whether queries may be issued on `frame` given the camera motion.
    pub fn queries_allowed(&self, camera_moving: bool, frame: u64) -> bool {
        match self.mode {
            OcclusionMode::Smooth => !camera_moving,
            OcclusionMode::Realtime => camera_moving && frame % self.realtime_interval == 0,
        }
    }

    /// Cached visibility. Unknown regions are visible.
    pub fn is_visible(&self, id: RegionId) -> bool {
        self.states.get(&id).is_none_or(|s| s.visible)
    }

    pub fn in_flight_count(&self) -> usize {
        self.states.values().filter(|s| s.in_flight.is_some()).count()
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    /// Drops everything: in-flight batches and cached results. Used on mesh swap.
    pub fn invalidate(&mut self) {
        self.states.clear();
        self.batches.clear();
        log::debug!("Occlusion state invalidated");
    }

    /// Recreates the query map after a structural change.
    ///
    /// In-flight batches are abandoned. Surviving regions keep their last answer,
    /// new regions start visible and removed regions are forgotten.
    pub fn rebuild(&mut self, ids: impl IntoIterator<Item = RegionId>) {
        let old = std::mem::take(&mut self.states);
        self.batches.clear();
        self.states = ids
            .into_iter()
            .map(|id| {
                let visible = old.get(&id).is_none_or(|s| s.visible);
                (id, RegionQueryState { visible, in_flight: None })
            })
            .collect();
    }

    /// Folds finished batches into the cache. Returns true if any visibility flipped.
    pub fn collect(&mut self, results: impl IntoIterator<Item = BatchResult>) -> bool {
        let mut changed = false;
        for result in results {
            let Some(ids) = self.batches.remove(&result.batch) else {
                continue;
            };
            let answers = result.visible.unwrap_or_default();
            for (i, id) in ids.iter().enumerate() {
                let Some(state) = self.states.get_mut(id) else {
                    continue;
                };
                if state.in_flight != Some(result.batch) {
                    continue;
                }
                state.in_flight = None;
                if let Some(&visible) = answers.get(i) {
                    if state.visible != visible {
                        state.visible = visible;
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Plans the next batch: every region without a query in flight, up to `limit`.
    ///
    /// Returns `None` when nothing needs querying.
    pub fn plan(&mut self, regions: &[QueryRequest], limit: usize) -> Option<QueryBatch> {
        let batch = self.next_batch;
        let mut queries = Vec::new();
        for request in regions {
            if queries.len() >= limit {
                break;
            }
            let state = self.states.entry(request.id).or_default();
            if state.in_flight.is_some() {
                continue;
            }
            state.in_flight = Some(batch);
            queries.push(*request);
        }
        if queries.is_empty() {
            return None;
        }
        self.next_batch += 1;
        self.batches.insert(batch, queries.iter().map(|q| q.id).collect());
        Some(QueryBatch { batch, queries })
    }
}
