//! Membership and recency filters over the canonical collection.
//!
//! Filters never copy records: a `FilteredView` holds the shared snapshot and
//! the positions of the records that passed, in collection order.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{CanonicalCollection, ContractRecord, MembershipKind, MembershipSets};

/// Last day (inclusive) of the green bucket.
const GREEN_MAX_DAYS: i64 = 7;
/// Last day (inclusive) of the yellow bucket.
const YELLOW_MAX_DAYS: i64 = 30;

/// Recency classification of a contact date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecencyBucket {
    /// 0-7 days since last contact.
    Green,
    /// 8-30 days.
    Yellow,
    /// More than 30 days.
    Red,
}

impl RecencyBucket {
    pub fn label(&self) -> &'static str {
        match self {
            RecencyBucket::Green => "green",
            RecencyBucket::Yellow => "yellow",
            RecencyBucket::Red => "red",
        }
    }
}

/// Classify a contact date relative to `today`.
///
/// This is the single source of recency for both list tagging and bucket
/// filtering. Dates in the future fall in no bucket.
pub fn classify_recency(date: NaiveDate, today: NaiveDate) -> Option<RecencyBucket> {
    let days_since = (today - date).num_days();
    match days_since {
        d if d < 0 => None,
        d if d <= GREEN_MAX_DAYS => Some(RecencyBucket::Green),
        d if d <= YELLOW_MAX_DAYS => Some(RecencyBucket::Yellow),
        _ => Some(RecencyBucket::Red),
    }
}

/// Recency restriction chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorBucket {
    #[default]
    All,
    Green,
    Yellow,
    Red,
}

impl ColorBucket {
    /// Whether a record with this contact date passes. A missing date only
    /// passes `All`.
    pub fn matches(&self, last_contact: Option<NaiveDate>, today: NaiveDate) -> bool {
        let wanted = match self {
            ColorBucket::All => return true,
            ColorBucket::Green => RecencyBucket::Green,
            ColorBucket::Yellow => RecencyBucket::Yellow,
            ColorBucket::Red => RecencyBucket::Red,
        };
        last_contact.and_then(|d| classify_recency(d, today)) == Some(wanted)
    }

    /// Plural label used in status messages.
    pub fn status_label(&self) -> &'static str {
        match self {
            ColorBucket::All => "all",
            ColorBucket::Green => "greens",
            ColorBucket::Yellow => "yellows",
            ColorBucket::Red => "reds",
        }
    }
}

impl std::str::FromStr for ColorBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ColorBucket::All),
            "green" => Ok(ColorBucket::Green),
            "yellow" => Ok(ColorBucket::Yellow),
            "red" => Ok(ColorBucket::Red),
            other => Err(format!("Unknown color bucket: {}", other)),
        }
    }
}

/// Filter criteria. The default keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub membership: BTreeSet<MembershipKind>,
    pub color: ColorBucket,
}

impl FilterSpec {
    pub fn is_unrestricted(&self) -> bool {
        self.membership.is_empty() && self.color == ColorBucket::All
    }
}

/// Ordered subset of a published snapshot.
#[derive(Debug, Clone, Default)]
pub struct FilteredView {
    snapshot: Arc<CanonicalCollection>,
    positions: Vec<usize>,
}

impl FilteredView {
    /// A view over every record of the snapshot.
    pub fn full(snapshot: Arc<CanonicalCollection>) -> Self {
        let positions = (0..snapshot.len()).collect();
        Self {
            snapshot,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ContractRecord> {
        self.positions
            .get(index)
            .and_then(|&pos| self.snapshot.get(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractRecord> + '_ {
        self.positions
            .iter()
            .filter_map(move |&pos| self.snapshot.get(pos))
    }

    /// View index of the first record with this contract code.
    pub fn position_of(&self, contract_code: &str) -> Option<usize> {
        self.iter().position(|r| r.contract_code == contract_code)
    }

    pub fn contract_codes(&self) -> Vec<&str> {
        self.iter().map(|r| r.contract_code.as_str()).collect()
    }
}

/// Apply membership then recency filters to the snapshot.
///
/// Selected membership sets are OR'd together; the membership and recency
/// steps are AND'd. `today` is pinned by the caller for the whole pass.
pub fn apply_filters(
    snapshot: &Arc<CanonicalCollection>,
    sets: &MembershipSets,
    spec: &FilterSpec,
    today: NaiveDate,
) -> FilteredView {
    let allowed: Option<HashSet<&str>> = if spec.membership.is_empty() {
        None
    } else {
        Some(
            spec.membership
                .iter()
                .flat_map(|kind| sets.get(*kind).iter().map(String::as_str))
                .collect(),
        )
    };

    let positions = snapshot
        .iter()
        .enumerate()
        .filter(|(_, record)| {
            allowed
                .as_ref()
                .map_or(true, |codes| codes.contains(record.contract_code.as_str()))
        })
        .filter(|(_, record)| spec.color.matches(record.last_contact_date, today))
        .map(|(pos, _)| pos)
        .collect();

    FilteredView {
        snapshot: Arc::clone(snapshot),
        positions,
    }
}
