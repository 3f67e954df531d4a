// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Credit growth on acknowledgment.
//!
//! The growth algorithm decides how much credit an ack event earns. Two
//! optional stages may withhold it:
//!
//! * The RTT gate compares the standing RTT, a minimum over the last
//!   smoothed RTT, with the minimum RTT over a long window. A standing RTT
//!   inflated above the threshold means the sender is building a queue, and
//!   no credit is earned.
//! * The post-loss skip is armed by a loss event and withholds credit until
//!   its release condition holds.

use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use super::AckEvent;
use super::CreditConfig;
use super::GrowthAlgorithm;
use super::Resolution;
use super::RttSample;
use super::WindowedMinFilter;
use crate::Error;
use crate::Result;

/// Release condition of the post-loss skip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipRelease {
    /// Withhold the credit of the next N ack events which would otherwise
    /// earn credit.
    AckCount(u64),

    /// Withhold credit until the bytes in flight drop to N datagrams or less.
    InflightBelow(u64),
}

/// Outcome of an ack event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Growth {
    /// Credit earned.
    Credit(u64),

    /// Withheld because the standing RTT is inflated.
    SuppressedByRtt,

    /// Withheld by the post-loss skip.
    SuppressedByLoss,
}

/// Minimum and standing RTT filters.
#[derive(Debug)]
struct RttGate {
    /// Min RTT over the configured window (10 seconds by default).
    min_rtt: WindowedMinFilter,

    /// Min RTT over the last smoothed RTT.
    standing_rtt: WindowedMinFilter,

    /// Ratio of standing RTT over min RTT above which credit is withheld.
    threshold: f64,

    /// Time origin of the filters.
    epoch: Option<Instant>,
}

impl RttGate {
    fn new(min_rtt_window: Duration, threshold: f64) -> Self {
        Self {
            min_rtt: WindowedMinFilter::new(micros(min_rtt_window)),
            standing_rtt: WindowedMinFilter::new(0),
            threshold,
            epoch: None,
        }
    }

    fn on_rtt_sample(&mut self, now: Instant, sample: &RttSample) {
        // A zero RTT is not a measurement.
        if sample.latest_rtt.is_zero() {
            return;
        }

        let epoch = *self.epoch.get_or_insert(now);
        let time = micros(now.saturating_duration_since(epoch));
        let rtt = micros(sample.latest_rtt);

        self.min_rtt.update(rtt, time);
        self.standing_rtt.set_window(micros(sample.smoothed_rtt));
        self.standing_rtt.update(rtt, time);
    }

    fn is_inflated(&self) -> bool {
        match (self.min_rtt.get(), self.standing_rtt.get()) {
            (Some(min_rtt), Some(standing_rtt)) => {
                standing_rtt as f64 > min_rtt as f64 * self.threshold
            }
            _ => false,
        }
    }
}

/// Post-loss suppression state.
#[derive(Debug)]
struct LossSkip {
    release: SkipRelease,

    /// Whether credit is currently withheld.
    armed: bool,

    /// Ack events left to withhold for `SkipRelease::AckCount`.
    remaining: u64,
}

impl LossSkip {
    fn new(release: SkipRelease) -> Self {
        Self {
            release,
            armed: false,
            remaining: 0,
        }
    }

    fn arm(&mut self) {
        match self.release {
            SkipRelease::AckCount(n) => {
                self.remaining = n;
                self.armed = n > 0;
            }
            SkipRelease::InflightBelow(_) => self.armed = true,
        }
    }

    /// Check whether the credit of this ack event is withheld.
    fn suppress(&mut self, bytes_in_flight: u64, max_datagram_size: u64) -> bool {
        if !self.armed {
            return false;
        }

        match self.release {
            SkipRelease::AckCount(_) => {
                self.remaining = self.remaining.saturating_sub(1);
                self.armed = self.remaining > 0;
                true
            }
            SkipRelease::InflightBelow(segments) => {
                if bytes_in_flight <= segments.saturating_mul(max_datagram_size) {
                    self.armed = false;
                }
                self.armed
            }
        }
    }
}

/// Decide the credit earned by ack events.
#[derive(Debug)]
pub struct GrowthPolicy {
    algorithm: GrowthAlgorithm,

    growth_factor: f64,

    max_datagram_size: u64,

    rtt_gate: Option<RttGate>,

    loss_skip: Option<LossSkip>,
}

impl GrowthPolicy {
    pub fn new(conf: &CreditConfig) -> Self {
        Self {
            algorithm: conf.growth_algorithm,
            growth_factor: conf.growth_factor,
            max_datagram_size: conf.max_datagram_size,
            rtt_gate: conf
                .rtt_gate_enabled
                .then(|| RttGate::new(conf.rtt_min_filter_len, conf.rtt_inflation_threshold)),
            loss_skip: conf.loss_skip.map(LossSkip::new),
        }
    }

    /// Arm the post-loss skip, if configured.
    pub fn on_loss(&mut self) {
        if let Some(skip) = self.loss_skip.as_mut() {
            skip.arm();
        }
    }

    /// Whether the post-loss skip is armed.
    pub fn in_loss_skip(&self) -> bool {
        self.loss_skip.as_ref().map_or(false, |s| s.armed)
    }

    /// Return the minimum RTT seen by the RTT gate.
    pub fn min_rtt(&self) -> Option<Duration> {
        let gate = self.rtt_gate.as_ref()?;
        gate.min_rtt.get().map(Duration::from_micros)
    }

    /// Return the standing RTT seen by the RTT gate.
    pub fn standing_rtt(&self) -> Option<Duration> {
        let gate = self.rtt_gate.as_ref()?;
        gate.standing_rtt.get().map(Duration::from_micros)
    }

    /// Feed the RTT sample of an ack event to the RTT gate.
    pub fn on_rtt_sample(&mut self, ack: &AckEvent) {
        if let (Some(gate), Some(rtt)) = (self.rtt_gate.as_mut(), ack.rtt.as_ref()) {
            gate.on_rtt_sample(ack.ack_time, rtt);
        }
    }

    /// Evaluate an ack event, taking its RTT sample first. The bytes in
    /// flight must already exclude the acked bytes.
    pub fn on_ack(
        &mut self,
        ack: &AckEvent,
        acked: &Resolution,
        bytes_in_flight: u64,
    ) -> Result<Growth> {
        self.on_rtt_sample(ack);
        if self.rtt_gate.as_ref().map_or(false, |g| g.is_inflated()) {
            return Ok(Growth::SuppressedByRtt);
        }

        if let Some(skip) = self.loss_skip.as_mut() {
            if skip.suppress(bytes_in_flight, self.max_datagram_size) {
                return Ok(Growth::SuppressedByLoss);
            }
        }

        let credit = match self.algorithm {
            GrowthAlgorithm::FixedPerAck => self
                .max_datagram_size
                .checked_mul(acked.packets)
                .ok_or_else(|| {
                    Error::Overflow(format!(
                        "growth {} * {}",
                        self.max_datagram_size, acked.packets
                    ))
                })?,
            GrowthAlgorithm::ScaledByAckedBytes => scale(acked.bytes, self.growth_factor)?,
        };

        Ok(Growth::Credit(credit))
    }
}

/// Multiply bytes by a factor, truncating the result.
fn scale(bytes: u64, factor: f64) -> Result<u64> {
    let v = bytes as f64 * factor;
    if !(v < u64::MAX as f64) {
        return Err(Error::Overflow(format!("growth {} * {}", bytes, factor)));
    }
    Ok(v as u64)
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecoveryConfig;

    fn acked(bytes: u64, packets: u64) -> Resolution {
        Resolution {
            bytes,
            packets,
            stale: 0,
        }
    }

    fn rtt_ack(now: Instant, latest: u64, smoothed: u64) -> AckEvent {
        AckEvent::new(now, 0, &[]).with_rtt(RttSample::new(
            Duration::from_millis(latest),
            Duration::from_millis(smoothed),
        ))
    }

    fn config() -> CreditConfig {
        CreditConfig::from(&RecoveryConfig::default())
    }

    #[test]
    fn growth_fixed_per_ack() -> Result<()> {
        let mut conf = config();
        conf.set_growth_algorithm(GrowthAlgorithm::FixedPerAck);
        let mut g = GrowthPolicy::new(&conf);
        let ack = AckEvent::new(Instant::now(), 3, &[]);

        // Independent of the acked bytes.
        assert_eq!(g.on_ack(&ack, &acked(300, 3), 0)?, Growth::Credit(3600));
        assert_eq!(g.on_ack(&ack, &acked(1200, 1), 0)?, Growth::Credit(1200));
        assert_eq!(g.on_ack(&ack, &acked(1200, 0), 0)?, Growth::Credit(0));

        assert!(matches!(
            g.on_ack(&ack, &acked(0, u64::MAX), 0),
            Err(Error::Overflow(_))
        ));

        Ok(())
    }

    #[test]
    fn growth_scaled_by_acked_bytes() -> Result<()> {
        let mut g = GrowthPolicy::new(&config());
        let ack = AckEvent::new(Instant::now(), 0, &[]);

        assert_eq!(g.on_ack(&ack, &acked(1200, 1), 0)?, Growth::Credit(1260));
        assert_eq!(g.on_ack(&ack, &acked(1000, 3), 0)?, Growth::Credit(1050));
        assert_eq!(g.on_ack(&ack, &acked(0, 0), 0)?, Growth::Credit(0));

        assert!(matches!(
            g.on_ack(&ack, &acked(u64::MAX, 1), 0),
            Err(Error::Overflow(_))
        ));

        Ok(())
    }

    #[test]
    fn growth_rtt_gate() -> Result<()> {
        let mut g = GrowthPolicy::new(&config());
        let now = Instant::now();
        let bytes = acked(1200, 1);

        // No sample yet.
        assert_eq!(g.min_rtt(), None);
        let ack = AckEvent::new(now, 0, &[]);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1260));

        // Standing RTT equals min RTT.
        let ack = rtt_ack(now, 100, 100);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1260));
        assert_eq!(g.min_rtt(), Some(Duration::from_millis(100)));
        assert_eq!(g.standing_rtt(), Some(Duration::from_millis(100)));

        // Standing RTT at 1.1 * min RTT is not inflated yet.
        let ack = rtt_ack(now + Duration::from_secs(1), 110, 105);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1260));
        assert_eq!(g.standing_rtt(), Some(Duration::from_millis(110)));

        // Inflated standing RTT.
        let ack = rtt_ack(now + Duration::from_secs(2), 150, 120);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByRtt);
        assert_eq!(g.min_rtt(), Some(Duration::from_millis(100)));
        assert_eq!(g.standing_rtt(), Some(Duration::from_millis(150)));

        // Stays inflated without new samples.
        let ack = AckEvent::new(now + Duration::from_secs(2), 0, &[]);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByRtt);

        // Queue drained.
        let ack = rtt_ack(now + Duration::from_secs(3), 105, 120);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1260));

        // Samples of zero are ignored.
        let ack = rtt_ack(now + Duration::from_secs(4), 0, 0);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1260));
        assert_eq!(g.standing_rtt(), Some(Duration::from_millis(105)));

        Ok(())
    }

    #[test]
    fn growth_rtt_gate_disabled() -> Result<()> {
        let mut conf = config();
        conf.enable_rtt_gate(false);
        let mut g = GrowthPolicy::new(&conf);
        let now = Instant::now();
        let bytes = acked(1200, 1);

        g.on_ack(&rtt_ack(now, 100, 100), &bytes, 0)?;
        let ack = rtt_ack(now + Duration::from_secs(1), 500, 400);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1260));
        assert_eq!(g.min_rtt(), None);

        Ok(())
    }

    #[test]
    fn growth_skip_ack_count() -> Result<()> {
        let mut conf = config();
        conf.set_loss_skip(Some(SkipRelease::AckCount(2)));
        let mut g = GrowthPolicy::new(&conf);
        let ack = AckEvent::new(Instant::now(), 0, &[]);
        let bytes = acked(1000, 1);

        assert!(!g.in_loss_skip());
        g.on_loss();
        assert!(g.in_loss_skip());
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByLoss);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByLoss);
        assert!(!g.in_loss_skip());
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1050));

        // Losses while armed restart the count.
        g.on_loss();
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByLoss);
        g.on_loss();
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByLoss);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByLoss);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1050));

        // Zero count never arms.
        let mut conf = config();
        conf.set_loss_skip(Some(SkipRelease::AckCount(0)));
        let mut g = GrowthPolicy::new(&conf);
        g.on_loss();
        assert!(!g.in_loss_skip());
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1050));

        Ok(())
    }

    #[test]
    fn growth_skip_inflight_below() -> Result<()> {
        let mut conf = config();
        conf.set_loss_skip(Some(SkipRelease::InflightBelow(2)));
        let mut g = GrowthPolicy::new(&conf);
        let ack = AckEvent::new(Instant::now(), 0, &[]);
        let bytes = acked(1200, 1);

        g.on_loss();
        assert_eq!(g.on_ack(&ack, &bytes, 6000)?, Growth::SuppressedByLoss);
        assert_eq!(g.on_ack(&ack, &bytes, 2401)?, Growth::SuppressedByLoss);
        assert!(g.in_loss_skip());

        // Released by the ack which drains the flight.
        assert_eq!(g.on_ack(&ack, &bytes, 2400)?, Growth::Credit(1260));
        assert!(!g.in_loss_skip());
        assert_eq!(g.on_ack(&ack, &bytes, 6000)?, Growth::Credit(1260));

        Ok(())
    }

    #[test]
    fn growth_rtt_gate_before_skip() -> Result<()> {
        let mut conf = config();
        conf.set_loss_skip(Some(SkipRelease::AckCount(1)));
        let mut g = GrowthPolicy::new(&conf);
        let now = Instant::now();
        let bytes = acked(1000, 1);

        g.on_ack(&rtt_ack(now, 100, 100), &bytes, 0)?;
        g.on_loss();

        // Withheld by the gate, the skip is not consumed.
        let ack = rtt_ack(now + Duration::from_secs(1), 200, 150);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByRtt);
        assert!(g.in_loss_skip());

        let ack = rtt_ack(now + Duration::from_secs(2), 100, 100);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::SuppressedByLoss);
        assert_eq!(g.on_ack(&ack, &bytes, 0)?, Growth::Credit(1050));

        Ok(())
    }

    #[test]
    fn scale_truncates() {
        assert_eq!(scale(1200, 1.05), Ok(1260));
        assert_eq!(scale(1001, 1.05), Ok(1051));
        assert_eq!(scale(1200, 0.0), Ok(0));
        assert!(scale(u64::MAX / 2, 4.0).is_err());
    }
}
