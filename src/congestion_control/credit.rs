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

//! Credit-based congestion control.
//!
//! The controller keeps a credit balance instead of a congestion window.
//! Sending spends credit, acknowledgments earn credit according to the
//! configured growth policy. There is no slow start and no recovery phase:
//! a loss only takes the lost bytes out of flight and optionally arms a
//! post-loss skip.

use std::time::Duration;

use log::*;

use super::AckEvent;
use super::CongestionController;
use super::CongestionStats;
use super::CreditLedger;
use super::CwndBounds;
use super::CwndSemantics;
use super::Growth;
use super::GrowthAlgorithm;
use super::GrowthPolicy;
use super::InflightTracker;
use super::LossEvent;
use super::ResolvedPacket;
use super::SentPacket;
use super::SkipRelease;
use crate::Error;
use crate::RecoveryConfig;
use crate::Result;

/// Credit Configuration.
#[derive(Debug, Clone)]
pub struct CreditConfig {
    /// Max datagram size in bytes.
    pub(super) max_datagram_size: u64,

    /// Initial credit balance in bytes.
    initial_congestion_window: u64,

    /// Bounds of the credit balance in bytes, if enforced.
    cwnd_bounds: Option<CwndBounds>,

    /// Growth algorithm.
    pub(super) growth_algorithm: GrowthAlgorithm,

    /// Factor applied to acked bytes by `ScaledByAckedBytes`.
    pub(super) growth_factor: f64,

    /// Enable the RTT gate.
    pub(super) rtt_gate_enabled: bool,

    /// Length of the min RTT filter window.
    pub(super) rtt_min_filter_len: Duration,

    /// Standing/min RTT ratio above which growth is withheld.
    pub(super) rtt_inflation_threshold: f64,

    /// Release condition of the post-loss skip.
    pub(super) loss_skip: Option<SkipRelease>,

    /// Take lost bytes off the credit balance.
    loss_debits_credit: bool,

    /// The value reported as congestion window.
    cwnd_semantics: CwndSemantics,
}

impl CreditConfig {
    pub fn from(conf: &RecoveryConfig) -> Self {
        let max_datagram_size = conf.max_datagram_size as u64;
        let initial_congestion_window = conf
            .initial_congestion_window
            .saturating_mul(max_datagram_size);
        let cwnd_bounds = conf.enable_cwnd_bounds.then(|| {
            CwndBounds::new(
                max_datagram_size,
                conf.min_congestion_window,
                conf.max_congestion_window,
            )
        });

        Self {
            max_datagram_size,
            initial_congestion_window,
            cwnd_bounds,
            growth_algorithm: conf.growth_algorithm,
            growth_factor: conf.growth_factor,
            rtt_gate_enabled: conf.enable_rtt_gate,
            rtt_min_filter_len: conf.rtt_min_filter_len,
            rtt_inflation_threshold: conf.rtt_inflation_threshold,
            loss_skip: conf.loss_skip,
            loss_debits_credit: conf.loss_debits_credit,
            cwnd_semantics: conf.cwnd_semantics,
        }
    }

    /// Update initial credit balance in bytes.
    pub fn set_initial_congestion_window(&mut self, initial_congestion_window: u64) -> &mut Self {
        self.initial_congestion_window = initial_congestion_window;
        self
    }

    /// Update bounds of the credit balance, `None` disables them.
    pub fn set_cwnd_bounds(&mut self, bounds: Option<CwndBounds>) -> &mut Self {
        self.cwnd_bounds = bounds;
        self
    }

    /// Update growth algorithm.
    pub fn set_growth_algorithm(&mut self, algor: GrowthAlgorithm) -> &mut Self {
        self.growth_algorithm = algor;
        self
    }

    /// Update growth factor.
    pub fn set_growth_factor(&mut self, factor: f64) -> &mut Self {
        self.growth_factor = factor;
        self
    }

    /// Enable the RTT gate.
    pub fn enable_rtt_gate(&mut self, enable: bool) -> &mut Self {
        self.rtt_gate_enabled = enable;
        self
    }

    /// Update release condition of the post-loss skip.
    pub fn set_loss_skip(&mut self, release: Option<SkipRelease>) -> &mut Self {
        self.loss_skip = release;
        self
    }

    /// Enable taking lost bytes off the credit balance.
    pub fn enable_loss_debits_credit(&mut self, enable: bool) -> &mut Self {
        self.loss_debits_credit = enable;
        self
    }

    /// Update congestion window semantics.
    pub fn set_cwnd_semantics(&mut self, semantics: CwndSemantics) -> &mut Self {
        self.cwnd_semantics = semantics;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_datagram_size == 0 {
            return Err(Error::InvalidConfig("zero datagram size".into()));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "growth factor {}",
                self.growth_factor
            )));
        }
        if !self.rtt_inflation_threshold.is_finite() || self.rtt_inflation_threshold < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "rtt inflation threshold {}",
                self.rtt_inflation_threshold
            )));
        }
        if self.rtt_min_filter_len.is_zero() {
            return Err(Error::InvalidConfig("zero rtt filter length".into()));
        }
        Ok(())
    }
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

/// Credit-based congestion controller.
#[derive(Debug)]
pub struct Credit {
    /// Configurations.
    config: CreditConfig,

    /// Bytes in flight.
    inflight: InflightTracker,

    /// Credit balance.
    ledger: CreditLedger,

    /// Credit earned by acknowledgments.
    growth: GrowthPolicy,

    /// Congestion statistics.
    stats: CongestionStats,

    /// Trace id used in logs.
    trace_id: String,
}

impl Credit {
    pub fn new(config: CreditConfig) -> Result<Self> {
        config.validate()?;

        let mut ledger = CreditLedger::new(config.initial_congestion_window, config.cwnd_semantics);
        if let Some(bounds) = config.cwnd_bounds.as_ref() {
            ledger.clamp(bounds);
        }

        Ok(Self {
            inflight: InflightTracker::new(),
            ledger,
            growth: GrowthPolicy::new(&config),
            stats: Default::default(),
            trace_id: String::new(),
            config,
        })
    }

    fn enforce_bounds(&mut self) {
        if let Some(bounds) = self.config.cwnd_bounds.as_ref() {
            self.ledger.clamp(bounds);
        }
    }

    fn on_loss(&mut self, loss: &LossEvent) -> Result<()> {
        let lost = self
            .inflight
            .on_packets_resolved(&loss.lost_packets, loss.lost_bytes)?;
        self.stats.stale_packets += lost.stale;
        self.stats.bytes_in_flight = self.inflight.bytes();
        if lost.is_empty() {
            return Ok(());
        }

        self.stats.bytes_lost_in_total = self.stats.bytes_lost_in_total.saturating_add(lost.bytes);
        if self.config.loss_debits_credit {
            self.ledger.debit(lost.bytes);
        }
        self.growth.on_loss();
        self.enforce_bounds();

        trace!(
            "{} {} ON_LOSS lost_size={} inflight={} credit={} skip={}",
            self.trace_id,
            self.name(),
            lost.bytes,
            self.inflight.bytes(),
            self.ledger.balance(),
            self.growth.in_loss_skip()
        );
        Ok(())
    }

    fn on_ack(&mut self, ack: &AckEvent) -> Result<()> {
        if ack.largest_acked_packet.is_none() {
            trace!(
                "{} {} ON_ACK without largest acked, ignored",
                self.trace_id,
                self.name()
            );
            return Ok(());
        }

        let acked = self
            .inflight
            .on_packets_resolved(&ack.acked_packets, ack.acked_bytes)?;
        self.stats.stale_packets += acked.stale;
        self.stats.bytes_in_flight = self.inflight.bytes();
        if acked.is_empty() {
            self.growth.on_rtt_sample(ack);
            return Ok(());
        }
        self.stats.bytes_acked_in_total =
            self.stats.bytes_acked_in_total.saturating_add(acked.bytes);

        let growth = self.growth.on_ack(ack, &acked, self.inflight.bytes())?;
        match growth {
            Growth::Credit(credit) => {
                self.ledger.credit(credit)?;
                self.stats.credit_granted_in_total =
                    self.stats.credit_granted_in_total.saturating_add(credit);
            }
            Growth::SuppressedByRtt => self.stats.acks_suppressed_by_rtt += 1,
            Growth::SuppressedByLoss => self.stats.acks_suppressed_by_loss += 1,
        }
        self.enforce_bounds();

        trace!(
            "now={:?} {} {} ON_ACK acked_size={} {:?} inflight={} credit={} min_rtt={:?} standing_rtt={:?}",
            ack.ack_time,
            self.trace_id,
            self.name(),
            acked.bytes,
            growth,
            self.inflight.bytes(),
            self.ledger.balance(),
            self.growth.min_rtt(),
            self.growth.standing_rtt()
        );
        Ok(())
    }
}

impl CongestionController for Credit {
    fn name(&self) -> &str {
        "CREDIT"
    }

    fn set_trace_id(&mut self, trace_id: &str) {
        self.trace_id = trace_id.to_string();
    }

    fn on_packet_sent(&mut self, packet: &SentPacket) -> Result<()> {
        if packet.encoded_size == 0 {
            return Ok(());
        }

        self.inflight.on_packet_sent(packet)?;
        self.ledger.debit(packet.encoded_size);
        self.enforce_bounds();

        self.stats.bytes_in_flight = self.inflight.bytes();
        self.stats.bytes_sent_in_total = self
            .stats
            .bytes_sent_in_total
            .saturating_add(packet.encoded_size);

        trace!(
            "{} {} ON_SENT {:?} inflight={} credit={}",
            self.trace_id,
            self.name(),
            packet,
            self.inflight.bytes(),
            self.ledger.balance()
        );
        Ok(())
    }

    fn on_packet_ack_or_loss(
        &mut self,
        ack: Option<&AckEvent>,
        loss: Option<&LossEvent>,
    ) -> Result<()> {
        if let Some(loss) = loss {
            self.on_loss(loss)?;
        }
        if let Some(ack) = ack {
            self.on_ack(ack)?;
        }
        Ok(())
    }

    fn on_packets_discarded(&mut self, packets: &[ResolvedPacket]) -> Result<()> {
        let discarded = self.inflight.on_packets_resolved(packets, 0)?;
        self.stats.bytes_in_flight = self.inflight.bytes();

        trace!(
            "{} {} ON_DISCARDED discarded_size={} inflight={}",
            self.trace_id,
            self.name(),
            discarded.bytes,
            self.inflight.bytes()
        );
        Ok(())
    }

    fn writable_bytes(&self) -> u64 {
        self.ledger.balance()
    }

    fn congestion_window(&self) -> u64 {
        self.ledger.congestion_window()
    }

    fn bytes_in_flight(&self) -> u64 {
        self.inflight.bytes()
    }

    fn initial_window(&self) -> u64 {
        self.config.initial_congestion_window
    }

    fn minimal_window(&self) -> u64 {
        self.config.cwnd_bounds.map_or(0, |b| b.min())
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
