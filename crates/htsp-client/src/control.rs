//! Coalescing control state shared between the consumer and the worker
//!
//! Speed and seek are single-slot requests: only the latest value matters,
//! and a new request while one is still in flight is refused rather than
//! queued. The stream-disable set has its own lock since the consumer
//! rewrites it independently of message flow.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

/// Slot-empty sentinel for the speed cell
const SPEED_EMPTY: i32 = i32::MIN;
/// Slot-empty sentinel for the seek cell; real targets are >= 0
const SEEK_EMPTY: i64 = -1;

pub struct ControlSlots {
    speed: AtomicI32,
    seek: AtomicI64,
    disable_dirty: AtomicBool,
    disables: Mutex<HashSet<u32>>,
}

impl Default for ControlSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSlots {
    pub fn new() -> Self {
        Self {
            speed: AtomicI32::new(SPEED_EMPTY),
            seek: AtomicI64::new(SEEK_EMPTY),
            disable_dirty: AtomicBool::new(false),
            disables: Mutex::new(HashSet::new()),
        }
    }

    /// Arm a speed change. Returns false if one is already pending.
    pub fn request_speed(&self, speed: i32) -> bool {
        self.speed
            .compare_exchange(SPEED_EMPTY, speed, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Arm a seek to an absolute stream time. Returns false if one is
    /// already pending.
    pub fn request_seek(&self, target: i64) -> bool {
        self.seek
            .compare_exchange(SEEK_EMPTY, target, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn take_speed(&self) -> Option<i32> {
        let v = self.speed.swap(SPEED_EMPTY, Ordering::AcqRel);
        (v != SPEED_EMPTY).then_some(v)
    }

    pub fn take_seek(&self) -> Option<i64> {
        let v = self.seek.swap(SEEK_EMPTY, Ordering::AcqRel);
        (v != SEEK_EMPTY).then_some(v)
    }

    /// Replace the disable set and mark it dirty for the worker.
    pub fn set_disables(&self, indices: HashSet<u32>) {
        *self.disables.lock() = indices;
        self.disable_dirty.store(true, Ordering::Release);
    }

    /// Apply an edit to the disable set and mark it dirty.
    pub fn update_disables(&self, f: impl FnOnce(&mut HashSet<u32>)) {
        let mut set = self.disables.lock();
        f(&mut set);
        drop(set);
        self.disable_dirty.store(true, Ordering::Release);
    }

    /// Whether a stream index is currently disabled.
    pub fn is_disabled(&self, index: u32) -> bool {
        self.disables.lock().contains(&index)
    }

    /// Snapshot the disable set if it changed since the last take.
    pub fn take_disables_if_dirty(&self) -> Option<HashSet<u32>> {
        if self
            .disable_dirty
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(self.disables.lock().clone())
    }
}

/// Timeshift window, in HTSP time units. Updated directly by the worker
/// from `timeshiftStatus`, read by the consumer for position/length.
#[derive(Default)]
pub struct TimeshiftWindow {
    shift: AtomicI64,
    start: AtomicI64,
    end: AtomicI64,
}

impl TimeshiftWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, shift: i64, start: i64, end: i64) {
        self.shift.store(shift, Ordering::Release);
        self.start.store(start, Ordering::Release);
        self.end.store(end, Ordering::Release);
    }

    /// Forget the accumulated shift after a seek lands.
    pub fn reset_shift(&self) {
        self.shift.store(0, Ordering::Release);
    }

    pub fn shift(&self) -> i64 {
        self.shift.load(Ordering::Acquire)
    }

    pub fn start(&self) -> i64 {
        self.start.load(Ordering::Acquire)
    }

    pub fn end(&self) -> i64 {
        self.end.load(Ordering::Acquire)
    }
}
