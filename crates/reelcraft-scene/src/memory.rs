//! Heap usage monitoring.
//!
//! The monitor does not own a timer. Its owner calls [`MemoryMonitor::poll`]
//! between frames and a check runs whenever the interval has elapsed. Each
//! check classifies usage against the thresholds and notifies warning
//! listeners only when the level differs from the last notified level.
//! Cleanup listeners are not debounced: they run on every check while usage
//! is critical and auto cleanup is on.

use parking_lot::Mutex;
use reelcraft_core::{budget, MemoryThresholds};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MB: f64 = 1024.0 * 1024.0;

/// Raw heap figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapSample {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub limit_bytes: u64,
}

/// Source of heap figures. Returns `None` where introspection is unavailable.
pub trait HeapProbe: Send {
    fn sample(&mut self) -> Option<HeapSample>;
}

/// Reads resident memory from `/proc/self/statm` and the limit from
/// `/proc/meminfo` (or an explicit override).
#[derive(Debug, Clone, Default)]
pub struct ProcHeapProbe {
    limit_override_mb: Option<f64>,
}

impl ProcHeapProbe {
    const PAGE_SIZE: u64 = 4096;

    pub fn new() -> Self {
        Self::default()
    }

    /// Measure usage against `limit_mb` instead of physical memory.
    pub fn with_limit_mb(limit_mb: f64) -> Self {
        Self {
            limit_override_mb: Some(limit_mb),
        }
    }

    fn read_statm() -> Option<(u64, u64)> {
        let text = std::fs::read_to_string("/proc/self/statm").ok()?;
        let mut fields = text.split_whitespace();
        let size: u64 = fields.next()?.parse().ok()?;
        let resident: u64 = fields.next()?.parse().ok()?;
        Some((size * Self::PAGE_SIZE, resident * Self::PAGE_SIZE))
    }

    fn read_mem_total() -> Option<u64> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        let line = text.lines().find(|l| l.starts_with("MemTotal:"))?;
        let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb * 1024)
    }
}

impl HeapProbe for ProcHeapProbe {
    fn sample(&mut self) -> Option<HeapSample> {
        let (size, resident) = Self::read_statm()?;
        let limit_bytes = match self.limit_override_mb {
            Some(mb) => (mb * MB) as u64,
            None => Self::read_mem_total()?,
        };
        Some(HeapSample {
            used_bytes: resident,
            total_bytes: size,
            limit_bytes,
        })
    }
}

/// Probe whose readings are set by hand. Clones share the reading.
#[derive(Debug, Clone, Default)]
pub struct ManualHeapProbe {
    sample: Arc<Mutex<Option<HeapSample>>>,
}

impl ManualHeapProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sample: Option<HeapSample>) {
        *self.sample.lock() = sample;
    }

    /// Report `percent` usage of a 1000 MB limit.
    pub fn set_usage_percent(&self, percent: f64) {
        let limit = (1000.0 * MB) as u64;
        let used = (limit as f64 * percent / 100.0) as u64;
        self.set(Some(HeapSample {
            used_bytes: used,
            total_bytes: used,
            limit_bytes: limit,
        }));
    }
}

impl HeapProbe for ManualHeapProbe {
    fn sample(&mut self) -> Option<HeapSample> {
        *self.sample.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub used_mb: f64,
    pub total_mb: f64,
    pub limit_mb: f64,
    pub usage_percentage: f64,
}

impl From<HeapSample> for MemoryStats {
    fn from(s: HeapSample) -> Self {
        let usage_percentage = if s.limit_bytes == 0 {
            0.0
        } else {
            s.used_bytes as f64 / s.limit_bytes as f64 * 100.0
        };
        Self {
            used_mb: s.used_bytes as f64 / MB,
            total_mb: s.total_bytes as f64 / MB,
            limit_mb: s.limit_bytes as f64 / MB,
            usage_percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryWarningLevel {
    Normal,
    Warning,
    Critical,
}

impl MemoryWarningLevel {
    pub fn classify(usage_percentage: f64, thresholds: &MemoryThresholds) -> Self {
        if usage_percentage >= thresholds.critical {
            Self::Critical
        } else if usage_percentage >= thresholds.warning {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of one check, for owners that react in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryCheck {
    pub stats: Option<MemoryStats>,
    pub level: Option<MemoryWarningLevel>,
    /// The level differs from the last notified one.
    pub level_changed: bool,
    /// Critical with auto cleanup on.
    pub cleanup_requested: bool,
}

impl MemoryCheck {
    const UNAVAILABLE: Self = Self {
        stats: None,
        level: None,
        level_changed: false,
        cleanup_requested: false,
    };
}

type WarningListener = Box<dyn FnMut(MemoryWarningLevel, &MemoryStats) + Send>;
type CleanupListener = Box<dyn FnMut(&MemoryStats) + Send>;

pub struct MemoryMonitor {
    probe: Box<dyn HeapProbe>,
    thresholds: MemoryThresholds,
    interval: Duration,
    next_check: Option<Instant>,
    last_level: Option<MemoryWarningLevel>,
    auto_cleanup: bool,
    warning_listeners: Vec<(ListenerId, WarningListener)>,
    cleanup_listeners: Vec<(ListenerId, CleanupListener)>,
    next_listener: u64,
}

impl MemoryMonitor {
    pub fn new(probe: Box<dyn HeapProbe>) -> Self {
        Self {
            probe,
            thresholds: MemoryThresholds::default(),
            interval: budget::MEMORY_CHECK_INTERVAL,
            next_check: None,
            last_level: None,
            auto_cleanup: true,
            warning_listeners: Vec::new(),
            cleanup_listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Current figures, or `None` when the platform cannot report them.
    pub fn stats(&mut self) -> Option<MemoryStats> {
        self.probe.sample().map(MemoryStats::from)
    }

    /// Arm periodic checks; the first poll after this checks immediately.
    pub fn start_monitoring(&mut self) {
        if self.next_check.is_some() {
            return;
        }
        self.next_check = Some(Instant::now());
        info!(interval_ms = self.interval.as_millis() as u64, "memory monitoring started");
    }

    pub fn stop_monitoring(&mut self) {
        if self.next_check.take().is_some() {
            info!("memory monitoring stopped");
        }
    }

    #[inline]
    pub fn is_monitoring(&self) -> bool {
        self.next_check.is_some()
    }

    /// Run a check if monitoring is on and the interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<MemoryCheck> {
        let due = self.next_check?;
        if now < due {
            return None;
        }
        self.next_check = Some(now + self.interval);
        Some(self.check_now())
    }

    /// Run a check immediately, independent of the schedule.
    pub fn check_now(&mut self) -> MemoryCheck {
        let Some(stats) = self.stats() else {
            debug!("heap statistics unavailable");
            return MemoryCheck::UNAVAILABLE;
        };
        let level = MemoryWarningLevel::classify(stats.usage_percentage, &self.thresholds);

        let level_changed = self.last_level != Some(level);
        if level_changed {
            self.last_level = Some(level);
            match level {
                MemoryWarningLevel::Normal => {
                    debug!(usage = stats.usage_percentage, "memory level normal")
                }
                _ => warn!(usage = stats.usage_percentage, ?level, "memory level changed"),
            }
            for (_, listener) in &mut self.warning_listeners {
                listener(level, &stats);
            }
        }

        let cleanup_requested = level == MemoryWarningLevel::Critical && self.auto_cleanup;
        if cleanup_requested {
            for (_, listener) in &mut self.cleanup_listeners {
                listener(&stats);
            }
        }

        MemoryCheck {
            stats: Some(stats),
            level: Some(level),
            level_changed,
            cleanup_requested,
        }
    }

    pub fn on_warning(
        &mut self,
        listener: impl FnMut(MemoryWarningLevel, &MemoryStats) + Send + 'static,
    ) -> ListenerId {
        let id = self.allocate_listener_id();
        self.warning_listeners.push((id, Box::new(listener)));
        id
    }

    pub fn on_cleanup(&mut self, listener: impl FnMut(&MemoryStats) + Send + 'static) -> ListenerId {
        let id = self.allocate_listener_id();
        self.cleanup_listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener of either kind. Returns whether it was found.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.warning_listeners.len() + self.cleanup_listeners.len();
        self.warning_listeners.retain(|(lid, _)| *lid != id);
        self.cleanup_listeners.retain(|(lid, _)| *lid != id);
        before != self.warning_listeners.len() + self.cleanup_listeners.len()
    }

    pub fn update_thresholds(&mut self, thresholds: MemoryThresholds) {
        self.thresholds = thresholds;
    }

    pub fn thresholds(&self) -> MemoryThresholds {
        self.thresholds
    }

    /// Change the interval, restarting the schedule if running.
    pub fn set_check_interval(&mut self, interval: Duration) {
        self.interval = interval;
        if self.next_check.is_some() {
            self.next_check = Some(Instant::now() + interval);
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.interval
    }

    pub fn set_auto_cleanup(&mut self, enabled: bool) {
        self.auto_cleanup = enabled;
    }

    /// Level reported to listeners most recently.
    pub fn last_level(&self) -> Option<MemoryWarningLevel> {
        self.last_level
    }

    fn allocate_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("thresholds", &self.thresholds)
            .field("interval", &self.interval)
            .field("monitoring", &self.is_monitoring())
            .field("last_level", &self.last_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> (MemoryMonitor, ManualHeapProbe) {
        let probe = ManualHeapProbe::new();
        (MemoryMonitor::new(Box::new(probe.clone())), probe)
    }

    #[test]
    fn test_warning_notifications_are_debounced() {
        let (mut monitor, probe) = monitor();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        monitor.on_warning(move |level, _| sink.lock().push(level));

        for usage in [60.0, 75.0, 82.0, 76.0] {
            probe.set_usage_percent(usage);
            monitor.check_now();
        }
        assert_eq!(
            *seen.lock(),
            vec![MemoryWarningLevel::Normal, MemoryWarningLevel::Warning]
        );
    }

    #[test]
    fn test_cleanup_fires_every_critical_check() {
        let (mut monitor, probe) = monitor();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        monitor.on_cleanup(move |_| *sink.lock() += 1);

        probe.set_usage_percent(90.0);
        for _ in 0..3 {
            assert!(monitor.check_now().cleanup_requested);
        }
        assert_eq!(*count.lock(), 3);

        monitor.set_auto_cleanup(false);
        assert!(!monitor.check_now().cleanup_requested);
        assert_eq!(*count.lock(), 3);
    }

    #[test]
    fn test_unavailable_stats_are_tolerated() {
        let (mut monitor, _probe) = monitor();
        let check = monitor.check_now();
        assert_eq!(check, MemoryCheck::UNAVAILABLE);
        assert!(monitor.stats().is_none());
    }

    #[test]
    fn test_poll_respects_interval() {
        let (mut monitor, probe) = monitor();
        probe.set_usage_percent(10.0);
        let now = Instant::now();
        assert!(monitor.poll(now).is_none());

        monitor.start_monitoring();
        monitor.start_monitoring();
        let first = Instant::now();
        assert!(monitor.poll(first).is_some());
        assert!(monitor.poll(first + Duration::from_secs(1)).is_none());
        assert!(monitor.poll(first + budget::MEMORY_CHECK_INTERVAL).is_some());

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
        assert!(monitor.poll(first + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_remove_listener() {
        let (mut monitor, probe) = monitor();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = monitor.on_warning(move |_, _| *sink.lock() += 1);
        assert!(monitor.remove_listener(id));
        assert!(!monitor.remove_listener(id));
        probe.set_usage_percent(80.0);
        monitor.check_now();
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_thresholds_are_live() {
        let (mut monitor, probe) = monitor();
        probe.set_usage_percent(50.0);
        assert_eq!(monitor.check_now().level, Some(MemoryWarningLevel::Normal));
        monitor.update_thresholds(MemoryThresholds::new(40.0, 60.0).unwrap());
        let check = monitor.check_now();
        assert_eq!(check.level, Some(MemoryWarningLevel::Warning));
        assert!(check.level_changed);
    }
}
