//! The poll throttle.
//!
//! A cycle is admitted only if the last logged stamp is at least one interval
//! old. The new stamp is logged before any client is contacted, so a cycle
//! that fails downstream still uses up its slot.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  record::TorrentRecord,
  store::{Repository, Table},
};

// ─── Stamps ──────────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so that lexical order is chronological order.
pub fn encode_stamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stamp. Offset-less ISO 8601 stamps are read as UTC.
///
/// Stores written by older tooling logged naive local time. Until a UTC stamp
/// follows them, the first throttle check against such a store is off by the
/// local UTC offset.
pub fn decode_stamp(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|naive| naive.and_utc())
    .map_err(|_| Error::Timestamp(s.to_owned()))
}

// ─── Throttle ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
  /// The cycle may proceed. `previous` is the stamp it follows, if any.
  Open { previous: Option<DateTime<Utc>> },
  /// Too soon after `last`; retry after `remaining`.
  Closed { last: DateTime<Utc>, remaining: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct Throttle {
  interval: Duration,
}

impl Throttle {
  pub fn new(interval: Duration) -> Self { Self { interval } }

  /// Decide whether a cycle starting at `now` may run after `last`.
  ///
  /// A stamp in the future (the clock moved backwards) does not block.
  pub fn check(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Gate {
    let Some(last) = last else {
      return Gate::Open { previous: None };
    };

    let elapsed = now.signed_duration_since(last);
    let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);

    if elapsed < TimeDelta::zero() {
      warn!(%last, %now, "last stamp lies in the future; not throttling");
      return Gate::Open { previous: Some(last) };
    }
    if elapsed < interval {
      let remaining = (interval - elapsed).to_std().unwrap_or_default();
      return Gate::Closed { last, remaining };
    }
    Gate::Open { previous: Some(last) }
  }

  /// Check against the store and, when open, log `now` as the new stamp.
  pub async fn admit<R: Repository>(&self, repo: &R, now: DateTime<Utc>) -> Result<Gate> {
    let last = repo
      .latest_stamp()
      .await
      .map_err(Error::store)?
      .map(|s| decode_stamp(&s))
      .transpose()?;

    let gate = self.check(last, now);
    match gate {
      Gate::Open { .. } => {
        let stamp = encode_stamp(now);
        debug!(%stamp, "logging poll stamp");
        repo
          .insert_row(Table::Stamps, TorrentRecord::new().with("timestamp", stamp))
          .await
          .map_err(Error::store)?;
      }
      Gate::Closed { remaining, .. } => {
        debug!(?remaining, "not enough time since last poll");
      }
    }
    Ok(gate)
  }
}

impl Default for Throttle {
  fn default() -> Self { Self::new(Duration::from_secs(crate::config::DEFAULT_INTERVAL_SECS)) }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap() }

  #[test]
  fn first_poll_is_open() {
    assert_eq!(Throttle::default().check(None, at(0)), Gate::Open { previous: None });
  }

  #[test]
  fn poll_within_interval_is_closed() {
    let gate = Throttle::default().check(Some(at(0)), at(1));
    assert_eq!(gate, Gate::Closed { last: at(0), remaining: Duration::from_secs(719) });
  }

  #[test]
  fn poll_at_exact_interval_is_open() {
    let gate = Throttle::default().check(Some(at(0)), at(720));
    assert_eq!(gate, Gate::Open { previous: Some(at(0)) });
  }

  #[test]
  fn poll_days_later_is_open() {
    let gate = Throttle::default().check(Some(at(0)), at(3 * 86_400 + 5));
    assert!(matches!(gate, Gate::Open { .. }));
  }

  #[test]
  fn future_stamp_does_not_block() {
    let gate = Throttle::default().check(Some(at(60)), at(0));
    assert_eq!(gate, Gate::Open { previous: Some(at(60)) });
  }

  #[test]
  fn stamps_are_fixed_width_and_roundtrip() {
    let a = encode_stamp(at(0));
    let b = encode_stamp(at(0) + TimeDelta::milliseconds(500));
    assert_eq!(a.len(), b.len());
    assert!(a < b);
    assert!(a.ends_with('Z'));
    assert_eq!(decode_stamp(&b).unwrap(), at(0) + TimeDelta::milliseconds(500));
  }

  #[test]
  fn naive_iso_stamps_are_read_as_utc() {
    let dt = decode_stamp("2023-11-14T22:13:20.123456").unwrap();
    assert_eq!(encode_stamp(dt), "2023-11-14T22:13:20.123456Z");
  }

  #[test]
  fn garbage_stamp_is_an_error() {
    assert!(matches!(decode_stamp("yesterday"), Err(Error::Timestamp(_))));
  }
}
