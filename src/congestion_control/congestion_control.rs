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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

use crate::Error;
use crate::RecoveryConfig;
use crate::Result;
pub use bounds::CwndBounds;
pub use credit::Credit;
pub use credit::CreditConfig;
pub use growth::Growth;
pub use growth::GrowthPolicy;
pub use growth::SkipRelease;
pub use inflight::InflightTracker;
pub use inflight::Resolution;
pub use ledger::CreditLedger;
pub use ledger::CwndSemantics;
pub use minmax::WindowedMinFilter;

/// Available credit growth algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthAlgorithm {
    /// FixedPerAck earns one maximum datagram of credit per newly acked
    /// packet, regardless of the packet size or the RTT. The credit grows
    /// linearly with the number of acknowledged packets.
    FixedPerAck,

    /// ScaledByAckedBytes earns the newly acked bytes multiplied by the
    /// growth factor. A factor above one deliberately over-credits relative
    /// to the delivered bytes so that the sending rate keeps increasing.
    #[default]
    ScaledByAckedBytes,
}

impl FromStr for GrowthAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<GrowthAlgorithm> {
        if algor.eq_ignore_ascii_case("fixed") || algor.eq_ignore_ascii_case("fixed_per_ack") {
            Ok(GrowthAlgorithm::FixedPerAck)
        } else if algor.eq_ignore_ascii_case("scaled")
            || algor.eq_ignore_ascii_case("scaled_by_acked_bytes")
        {
            Ok(GrowthAlgorithm::ScaledByAckedBytes)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Metadata of a packet handed to the congestion controller on send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SentPacket {
    /// The packet number of the sent packet.
    pub pkt_num: u64,

    /// The number of bytes sent in the packet, not including UDP or IP
    /// overhead, but including QUIC framing overhead.
    pub encoded_size: u64,
}

impl SentPacket {
    pub fn new(pkt_num: u64, encoded_size: u64) -> Self {
        Self {
            pkt_num,
            encoded_size,
        }
    }
}

/// Metadata of a packet that was acknowledged, declared lost or discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedPacket {
    /// The packet number of the sent packet.
    pub pkt_num: u64,

    /// The encoded size reported by the caller. The size recorded on send
    /// takes precedence.
    pub encoded_size: u64,
}

impl ResolvedPacket {
    pub fn new(pkt_num: u64, encoded_size: u64) -> Self {
        Self {
            pkt_num,
            encoded_size,
        }
    }
}

/// RTT samples provided by the RTT estimator of the path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RttSample {
    /// The most recent RTT sample.
    pub latest_rtt: Duration,

    /// The smoothed RTT of the path.
    pub smoothed_rtt: Duration,
}

impl RttSample {
    pub fn new(latest_rtt: Duration, smoothed_rtt: Duration) -> Self {
        Self {
            latest_rtt,
            smoothed_rtt,
        }
    }
}

/// Acknowledgment of one or more packets.
#[derive(Clone, Debug)]
pub struct AckEvent {
    /// Total bytes acknowledged. Only used when `acked_packets` is empty.
    pub acked_bytes: u64,

    /// The newly acknowledged packets.
    pub acked_packets: SmallVec<[ResolvedPacket; 8]>,

    /// The time the ACK frame was processed.
    pub ack_time: Instant,

    /// The largest packet number acknowledged by the ACK frame. An event
    /// without it carries too little information and is ignored.
    pub largest_acked_packet: Option<u64>,

    /// RTT samples taken on this acknowledgment, if any.
    pub rtt: Option<RttSample>,
}

impl AckEvent {
    /// Create an acknowledgment of the given packets.
    pub fn new(ack_time: Instant, largest_acked_packet: u64, packets: &[ResolvedPacket]) -> Self {
        Self {
            acked_bytes: packets.iter().map(|p| p.encoded_size).sum(),
            acked_packets: SmallVec::from_slice(packets),
            ack_time,
            largest_acked_packet: Some(largest_acked_packet),
            rtt: None,
        }
    }

    /// Attach RTT samples to the acknowledgment.
    pub fn with_rtt(mut self, rtt: RttSample) -> Self {
        self.rtt = Some(rtt);
        self
    }
}

/// Packets declared lost by loss detection.
#[derive(Clone, Debug, Default)]
pub struct LossEvent {
    /// Total bytes lost. Only used when `lost_packets` is empty.
    pub lost_bytes: u64,

    /// The newly lost packets.
    pub lost_packets: SmallVec<[ResolvedPacket; 8]>,
}

impl LossEvent {
    /// Create a loss event for the given packets.
    pub fn new(packets: &[ResolvedPacket]) -> Self {
        Self {
            lost_bytes: packets.iter().map(|p| p.encoded_size).sum(),
            lost_packets: SmallVec::from_slice(packets),
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Bytes in flight.
    pub bytes_in_flight: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,

    /// Total credit earned by acknowledgments.
    pub credit_granted_in_total: u64,

    /// Number of ack events whose credit was withheld by the RTT gate.
    pub acks_suppressed_by_rtt: u64,

    /// Number of ack events whose credit was withheld after a loss.
    pub acks_suppressed_by_loss: u64,

    /// Number of acked or lost reports for packets which were not in flight.
    pub stale_packets: u64,
}

/// Congestion control interfaces the packet scheduler depends on.
///
/// A controller belongs to a single connection and is driven sequentially.
/// `Overflow`, `Underflow` and `InvalidState` errors returned by the event
/// callbacks are fatal for the connection.
pub trait CongestionController: Send {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Set the trace id used in logs.
    fn set_trace_id(&mut self, trace_id: &str) {}

    /// Callback after packet was sent out.
    fn on_packet_sent(&mut self, packet: &SentPacket) -> Result<()>;

    /// Callback after packets were acknowledged and/or declared lost.
    fn on_packet_ack_or_loss(
        &mut self,
        ack: Option<&AckEvent>,
        loss: Option<&LossEvent>,
    ) -> Result<()>;

    /// Callback after packets were removed from flight without being acked
    /// or lost, for instance when their packet number space is discarded.
    fn on_packets_discarded(&mut self, packets: &[ResolvedPacket]) -> Result<()>;

    /// Bytes which may be sent immediately.
    fn writable_bytes(&self) -> u64;

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Bytes in flight.
    fn bytes_in_flight(&self) -> u64;

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        false
    }

    /// Check if the sender is application limited. Unsupported.
    fn is_app_limited(&self) -> bool {
        false
    }

    /// Mark the sender as application limited. Unsupported.
    fn set_app_limited(&mut self) {}

    /// Mark the sender as idle or busy. Unsupported.
    fn set_app_idle(&mut self, idle: bool, now: Instant) {}

    /// Initial congestion window.
    fn initial_window(&self) -> u64;

    /// Minimal congestion window.
    fn minimal_window(&self) -> u64;

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(
    conf: &RecoveryConfig,
) -> Result<Box<dyn CongestionController>> {
    conf.validate()?;
    Ok(Box::new(Credit::new(CreditConfig::from(conf))?))
}


mod bounds;
mod credit;
mod growth;
mod inflight;
mod ledger;
mod minmax;
