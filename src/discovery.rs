use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

use crate::registry::{RegistrySource, WorkspaceRegistry};

/// Fetch offsets of one discovery burst, relative to the trigger.
pub const BURST_OFFSETS_MS: [u64; 4] = [0, 5_000, 15_000, 30_000];
/// Steady poll interval while nothing is installed.
pub const IDLE_POLL_MS: u64 = 5_000;

pub trait Clock {
    fn now_ms(&self) -> u64;

    fn sleep_until(&self, deadline_ms: u64);
}

pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn sleep_until(&self, deadline_ms: u64) {
        let now = self.now_ms();
        if deadline_ms > now {
            thread::sleep(Duration::from_millis(deadline_ms - now));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub id: TimerId,
    pub due_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Snapshot {
    Idle,
    Installed { registry: WorkspaceRegistry },
    NotInstalled { registry: WorkspaceRegistry },
    Unknown { error: String },
}

impl Snapshot {
    pub fn registry(&self) -> Option<&WorkspaceRegistry> {
        match self {
            Snapshot::Installed { registry } | Snapshot::NotInstalled { registry } => Some(registry),
            _ => None,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, Snapshot::Installed { .. })
    }

    /// Equality ignoring fetch timestamps.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        match (self, other) {
            (Snapshot::Idle, Snapshot::Idle) => true,
            (Snapshot::Unknown { error: a }, Snapshot::Unknown { error: b }) => a == b,
            (Snapshot::Installed { registry: a }, Snapshot::Installed { registry: b })
            | (Snapshot::NotInstalled { registry: a }, Snapshot::NotInstalled { registry: b }) => {
                a.base_url == b.base_url && a.workspaces == b.workspaces && a.source == b.source
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Installed,
    NotInstalled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Burst { fired: usize },
    Poll,
}

/// Owns the registry slot and every scheduled fetch. Time is passed in as
/// milliseconds from the owner's clock.
#[derive(Debug)]
pub struct DiscoveryScheduler {
    next_timer: u64,
    pending: Vec<Timer>,
    snapshot: Snapshot,
    in_flight: bool,
    last_settled_ms: Option<u64>,
}

impl Default for DiscoveryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryScheduler {
    pub fn new() -> Self {
        Self {
            next_timer: 0,
            pending: Vec::new(),
            snapshot: Snapshot::Idle,
            in_flight: false,
            last_settled_ms: None,
        }
    }

    /// Starts a new burst at `now_ms`, discarding any unfired timers.
    pub fn trigger(&mut self, now_ms: u64) -> Vec<TimerId> {
        let cancelled = self.pending.len();
        self.pending.clear();
        let ids: Vec<TimerId> = BURST_OFFSETS_MS
            .iter()
            .map(|offset| {
                let id = TimerId(self.next_timer);
                self.next_timer += 1;
                self.pending.push(Timer {
                    id,
                    due_ms: now_ms + offset,
                });
                id
            })
            .collect();
        tracing::debug!(now_ms, cancelled, "discovery burst scheduled");
        ids
    }

    pub fn pending(&self) -> &[Timer] {
        &self.pending
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight {
            return Phase::Fetching;
        }
        match self.snapshot {
            Snapshot::Idle => Phase::Idle,
            Snapshot::Installed { .. } => Phase::Installed,
            Snapshot::NotInstalled { .. } => Phase::NotInstalled,
            Snapshot::Unknown { .. } => Phase::Unknown,
        }
    }

    fn idle_poll_due(&self) -> Option<u64> {
        if self.in_flight {
            return None;
        }
        match self.snapshot {
            Snapshot::NotInstalled { .. } | Snapshot::Unknown { .. } => {
                self.last_settled_ms.map(|at| at + IDLE_POLL_MS)
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        let burst = self.pending.iter().map(|timer| timer.due_ms).min();
        match (burst, self.idle_poll_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fires whatever is due at `now_ms`. Several due timers collapse into one fetch.
    pub fn take_due(&mut self, now_ms: u64) -> Option<FetchReason> {
        if self.in_flight {
            return None;
        }
        let before = self.pending.len();
        self.pending.retain(|timer| timer.due_ms > now_ms);
        let fired = before - self.pending.len();
        if fired > 0 {
            return Some(FetchReason::Burst { fired });
        }
        match self.idle_poll_due() {
            Some(due) if due <= now_ms => Some(FetchReason::Poll),
            _ => None,
        }
    }

    pub fn begin_fetch(&mut self) {
        self.in_flight = true;
    }

    /// Replaces the slot with the fetch outcome. Returns true when the content changed.
    pub fn complete(&mut self, now_ms: u64, result: Result<WorkspaceRegistry, String>) -> bool {
        self.in_flight = false;
        self.last_settled_ms = Some(now_ms);
        let next = match result {
            Ok(registry) if registry.installed => Snapshot::Installed { registry },
            Ok(registry) => Snapshot::NotInstalled { registry },
            Err(error) => Snapshot::Unknown { error },
        };
        let changed = !self.snapshot.same_content(&next);
        self.snapshot = next;
        changed
    }

    /// Teardown: drops every pending timer and reports how many were live.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        self.last_settled_ms = None;
        cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopWhen {
    /// No burst timer is left.
    BurstDrained,
    /// Workspaces are installed and no burst timer is left.
    Installed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetches: u32,
    pub failures: u32,
    pub cancelled_timers: usize,
}

/// Drives the scheduler on the calling thread until `stop` holds or
/// `deadline_ms` passes. `observer` sees every completed fetch.
pub fn run_until<C, R, F>(
    scheduler: &mut DiscoveryScheduler,
    source: &R,
    clock: &C,
    stop: StopWhen,
    deadline_ms: Option<u64>,
    mut observer: F,
) -> RunSummary
where
    C: Clock + ?Sized,
    R: RegistrySource + ?Sized,
    F: FnMut(&Snapshot, bool),
{
    let mut summary = RunSummary::default();
    loop {
        let now = clock.now_ms();
        if let Some(reason) = scheduler.take_due(now) {
            scheduler.begin_fetch();
            let result = source.fetch().map_err(|err| err.to_string());
            match &result {
                Ok(registry) => tracing::info!(
                    ?reason,
                    source = %source.describe(),
                    installed = registry.installed,
                    workspaces = registry.workspaces.len(),
                    "registry fetched"
                ),
                Err(err) => {
                    summary.failures += 1;
                    tracing::warn!(?reason, source = %source.describe(), %err, "registry fetch failed");
                }
            }
            summary.fetches += 1;
            let changed = scheduler.complete(clock.now_ms(), result);
            observer(scheduler.snapshot(), changed);
            continue;
        }

        let drained = scheduler.pending().is_empty();
        let done = match stop {
            StopWhen::BurstDrained => drained,
            StopWhen::Installed => drained && scheduler.snapshot().is_installed(),
        };
        if done || deadline_ms.is_some_and(|deadline| now >= deadline) {
            break;
        }

        let target = match (scheduler.next_deadline(), deadline_ms) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        clock.sleep_until(target);
    }
    summary.cancelled_timers = scheduler.cancel_all();
    if summary.cancelled_timers > 0 {
        tracing::debug!(cancelled = summary.cancelled_timers, "discovery timers cancelled");
    }
    summary
}
