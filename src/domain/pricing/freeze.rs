use chrono::{DateTime, TimeDelta, Utc};

/// Hold/override bookkeeping for a value that decays with time.
///
/// While held, the last computed value is served and the held interval is
/// excluded from the decay clock, so releasing the hold resumes decay from
/// the frozen value instead of jumping ahead. An override bypasses the
/// cache entirely; once it is cleared the cache is discarded and recomputed.
#[derive(Debug, Clone)]
pub struct FreezeState {
    /// Last served value and the wall-clock instant it was computed at.
    frozen: Option<(i64, DateTime<Utc>)>,
    held_since: Option<DateTime<Utc>>,
    held_total: TimeDelta,
    overridden: bool,
}

impl Default for FreezeState {
    fn default() -> Self {
        Self {
            frozen: None,
            held_since: None,
            held_total: TimeDelta::zero(),
            overridden: false,
        }
    }
}

impl FreezeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value to serve at `now`. `compute` is evaluated at the
    /// effective decay instant (wall clock minus accumulated hold time).
    pub fn observe(
        &mut self,
        now: DateTime<Utc>,
        hold: bool,
        override_value: Option<i64>,
        compute: impl FnOnce(DateTime<Utc>) -> i64,
    ) -> i64 {
        if let Some(value) = override_value {
            self.overridden = true;
            return value;
        }
        if self.overridden {
            self.overridden = false;
            self.frozen = None;
        }

        if hold {
            // The served value has been frozen since it was last computed.
            let anchor = self.frozen.map_or(now, |(_, computed_at)| computed_at.min(now));
            let since = *self.held_since.get_or_insert(anchor);
            if let Some((value, _)) = self.frozen {
                return value;
            }
            let value = compute(since - self.held_total);
            self.frozen = Some((value, since));
            return value;
        }

        if let Some(since) = self.held_since.take() {
            if now > since {
                self.held_total = self.held_total + (now - since);
            }
        }
        let value = compute(now - self.held_total);
        self.frozen = Some((value, now));
        value
    }

    pub fn held_total(&self) -> TimeDelta {
        self.held_total
    }
}
