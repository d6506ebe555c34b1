//! The change detector: fetched record + stored state → what to write.
//!
//! Identity metadata (tracker, category, save path) may be edited by the user
//! without the torrent becoming a different one, so a couple of differing
//! static fields only append a data row. Wide drift is treated as a new
//! identity and replaces the static row.

use crate::{
  fields::{FieldGroup, TRACKED_FIELDS},
  record::{FieldValue, TorrentRecord},
};

/// Number of differing static fields at which the stored static row is
/// replaced instead of kept.
pub const REPLACE_THRESHOLD: usize = 3;

/// The decision for one fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
  /// Tracked metrics match the latest observation; nothing is written.
  Unchanged,
  /// Known torrent with minor or no static drift; append a data row.
  MetricUpdate { drift: usize },
  /// First sighting of this `(hash, client)`; insert static and data rows.
  New,
  /// Static drift reached [`REPLACE_THRESHOLD`]; replace the static row and
  /// append a data row.
  Replaced { drift: usize },
}

impl Change {
  pub fn writes_static(self) -> bool { matches!(self, Self::New | Self::Replaced { .. }) }

  pub fn writes_data(self) -> bool { !matches!(self, Self::Unchanged) }
}

/// Whether the tracked fields of `record` equal those of `observation`.
/// An absent field reads as `NULL` on either side.
pub fn tracked_fields_match(record: &TorrentRecord, observation: &TorrentRecord) -> bool {
  TRACKED_FIELDS.iter().all(|field| {
    let current = record.get(field).unwrap_or(&FieldValue::Null);
    let stored = observation.get(field).unwrap_or(&FieldValue::Null);
    current.same_as(stored)
  })
}

/// Count the static fields of the stored row that `record` does not carry
/// with the same value. A stored `NULL` matches an absent field.
pub fn static_drift(record: &TorrentRecord, prior: &TorrentRecord) -> usize {
  prior
    .iter()
    .filter(|(name, _)| FieldGroup::Static.contains(name))
    .filter(|(name, stored)| {
      let current = record.get(name).unwrap_or(&FieldValue::Null);
      !current.same_as(stored)
    })
    .count()
}

/// Decide what to write for `record`.
///
/// - `prior_static`: the stored static row for the record's `(hash, client)`.
/// - `last_observation`: the most recent stored data row for the same key.
pub fn detect(
  record: &TorrentRecord,
  prior_static: Option<&TorrentRecord>,
  last_observation: Option<&TorrentRecord>,
) -> Change {
  if let Some(observation) = last_observation
    && tracked_fields_match(record, observation)
  {
    return Change::Unchanged;
  }

  match prior_static {
    None => Change::New,
    Some(prior) => {
      let drift = static_drift(record, prior);
      if drift < REPLACE_THRESHOLD {
        Change::MetricUpdate { drift }
      } else {
        Change::Replaced { drift }
      }
    }
  }
}
