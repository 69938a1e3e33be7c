//! Free/busy math over half-open time intervals. Everything in here is
//! pure so it can be tested without touching the calendar API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

/// A half-open `[start, end)` range during which a calendar is occupied.
/// Always UTC so intervals from different calendars compare directly.
#[derive(Debug, Clone, PartialEq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Half-open overlap test: `[a0, a1)` and `[b0, b1)` overlap iff
/// `max(a0, b0) < min(a1, b1)`. Touching endpoints do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

/// Whether `[start, end)` is clear of every busy interval.
pub fn is_window_free(busy: &[BusyInterval], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    !busy
        .iter()
        .any(|b| overlaps(start, end, b.start, b.end))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Busy,
}

/// One labeled candidate window starting at `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<T: TimeZone> {
    pub start: DateTime<T>,
    pub status: SlotStatus,
}

/// Walk candidate windows of `slot` length from `from`, advancing by
/// `step`, and return the start of the first one that doesn't overlap
/// any busy interval. `None` when no window fits before `work_end`.
pub fn first_free_slot<T: TimeZone>(
    busy: &[BusyInterval],
    from: DateTime<T>,
    work_end: DateTime<T>,
    slot: Duration,
    step: Duration,
) -> Option<DateTime<T>> {
    let mut t = from;
    while t.clone() + slot <= work_end {
        let start = t.with_timezone(&Utc);
        if is_window_free(busy, start, start + slot) {
            return Some(t);
        }
        t = t + step;
    }
    None
}

/// Label every candidate window between `work_start` and `work_end`,
/// one slot per `step`. With `step < slot` the windows overlap, which
/// is what a "when am I free around 3pm" style answer wants.
pub fn day_breakdown<T: TimeZone>(
    busy: &[BusyInterval],
    work_start: DateTime<T>,
    work_end: DateTime<T>,
    slot: Duration,
    step: Duration,
) -> Vec<Slot<T>> {
    let mut slots = Vec::new();
    let mut t = work_start;
    while t.clone() + slot <= work_end {
        let start = t.with_timezone(&Utc);
        let status = if is_window_free(busy, start, start + slot) {
            SlotStatus::Free
        } else {
            SlotStatus::Busy
        };
        slots.push(Slot {
            start: t.clone(),
            status,
        });
        t = t + step;
    }
    slots
}

/// Non-overlapping partition of the working day into back-to-back
/// windows of `slot` length.
pub fn free_partition<T: TimeZone>(
    busy: &[BusyInterval],
    work_start: DateTime<T>,
    work_end: DateTime<T>,
    slot: Duration,
) -> Vec<Slot<T>> {
    day_breakdown(busy, work_start, work_end, slot, slot)
}
