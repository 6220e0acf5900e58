//! Greedy group selection.
//!
//! Candidates are ordered by seats ascending, then by creation time, then by
//! booking id, and taken first-fit: a candidate that would overflow the cap
//! is skipped and the walk continues. The walk stops as soon as the group is
//! exactly full. Smaller parties are favoured so that as many bookings as
//! possible travel.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_booking::domain::records::BookingRecord;
use wayfare_booking::ledger::DepartureKey;
use wayfare_core::lifecycle::BookingStatus;

/// A pending booking considered for a departure group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The booking.
    pub booking_id: Uuid,
    /// Seats it needs.
    pub seats: u32,
    /// When it was requested.
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    /// Builds a candidate from a record, if it is pending on `key`.
    #[must_use]
    pub fn from_record(record: &BookingRecord, key: DepartureKey) -> Option<Self> {
        let booking = record.booking();
        let eligible = booking.status() == BookingStatus::Pending
            && booking.package_id() == key.package_id
            && booking.travel_date() == key.travel_date;
        eligible.then(|| Self {
            booking_id: booking.id(),
            seats: booking.seats_requested(),
            created_at: booking.created_at(),
        })
    }
}

/// A departure group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// The package.
    pub package_id: Uuid,
    /// The departure date.
    pub travel_date: NaiveDate,
    /// Selected bookings, in selection order.
    pub booking_ids: Vec<Uuid>,
    /// Seats taken by the selected bookings.
    pub seats_total: u32,
    /// The seat cap used.
    pub capacity: u32,
}

/// Result of one matching pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// At least one booking fits.
    Matched(MatchResult),
    /// No pending demand, or nothing fits under the cap.
    NoMatch,
}

impl MatchOutcome {
    /// The group, if one was formed.
    #[must_use]
    pub fn as_matched(&self) -> Option<&MatchResult> {
        match self {
            Self::Matched(result) => Some(result),
            Self::NoMatch => None,
        }
    }
}

/// Picks a group from `candidates` for `key` under `capacity`.
#[must_use]
pub fn select_group(key: DepartureKey, mut candidates: Vec<Candidate>, capacity: u32) -> MatchOutcome {
    candidates.sort_by(|a, b| {
        a.seats
            .cmp(&b.seats)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.booking_id.cmp(&b.booking_id))
    });

    let mut booking_ids = Vec::new();
    let mut seats_total: u32 = 0;
    for candidate in &candidates {
        let Some(next) = seats_total.checked_add(candidate.seats) else {
            continue;
        };
        if next > capacity {
            continue;
        }
        booking_ids.push(candidate.booking_id);
        seats_total = next;
        if seats_total == capacity {
            break;
        }
    }

    if booking_ids.is_empty() {
        return MatchOutcome::NoMatch;
    }
    MatchOutcome::Matched(MatchResult {
        package_id: key.package_id,
        travel_date: key.travel_date,
        booking_ids,
        seats_total,
        capacity,
    })
}
