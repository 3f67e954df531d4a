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

use log::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::ResolvedPacket;
use super::SentPacket;
use crate::Error;
use crate::Result;

/// Bytes and packets taken out of flight by an event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Bytes removed from flight.
    pub bytes: u64,

    /// Packets removed from flight.
    pub packets: u64,

    /// Reported packets which were not in flight.
    pub stale: u64,
}

impl Resolution {
    /// Whether the event resolved nothing.
    pub fn is_empty(&self) -> bool {
        self.bytes == 0 && self.packets == 0
    }
}

/// Bytes sent but not yet acknowledged or declared lost.
///
/// Unlike the credit balance, the counter never saturates: an addition out
/// of range is an `Overflow` and a removal of more bytes than in flight is an
/// `Underflow`. Both mean the accounting of the caller is broken.
///
/// The bytes in flight always equal the sum of the sizes recorded for the
/// packets in flight, so the bytes of a packet are removed at most once.
#[derive(Debug, Default)]
pub struct InflightTracker {
    /// Bytes in flight.
    bytes: u64,

    /// Bytes of the packets in flight not yet removed, keyed by packet
    /// number.
    outstanding: FxHashMap<u64, u64>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bytes in flight.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    #[cfg(test)]
    fn packets(&self) -> usize {
        self.outstanding.len()
    }

    #[cfg(test)]
    fn contains(&self, pkt_num: u64) -> bool {
        self.outstanding.contains_key(&pkt_num)
    }

    fn checked_add(&self, bytes: u64) -> Result<u64> {
        self.bytes
            .checked_add(bytes)
            .ok_or_else(|| Error::Overflow(format!("inflight {} + {}", self.bytes, bytes)))
    }

    fn checked_sub(&self, bytes: u64) -> Result<u64> {
        self.bytes
            .checked_sub(bytes)
            .ok_or_else(|| Error::Underflow(format!("inflight {} - {}", self.bytes, bytes)))
    }

    /// Put a packet in flight.
    pub fn on_packet_sent(&mut self, packet: &SentPacket) -> Result<()> {
        if self.outstanding.contains_key(&packet.pkt_num) {
            return Err(Error::InvalidState(format!(
                "packet {} already in flight",
                packet.pkt_num
            )));
        }
        self.bytes = self.checked_add(packet.encoded_size)?;
        self.outstanding
            .insert(packet.pkt_num, packet.encoded_size);
        Ok(())
    }

    /// Take acked, lost or discarded packets out of flight.
    ///
    /// Packets which are not in flight, because they were already resolved
    /// or never sent, are skipped. The size recorded on send is removed for
    /// the others. If no packet is listed, `bytes` is charged to the packets
    /// in flight from the lowest packet number up, see `on_bytes_resolved`.
    ///
    /// Nothing is changed if an error is returned.
    pub fn on_packets_resolved(
        &mut self,
        packets: &[ResolvedPacket],
        bytes: u64,
    ) -> Result<Resolution> {
        if packets.is_empty() {
            return self.on_bytes_resolved(bytes);
        }

        let mut resolution = Resolution::default();
        let mut fresh: SmallVec<[u64; 8]> = SmallVec::new();
        for pkt in packets {
            match self.outstanding.get(&pkt.pkt_num) {
                Some(&size) if !fresh.contains(&pkt.pkt_num) => {
                    resolution.bytes = resolution.bytes.saturating_add(size);
                    resolution.packets += 1;
                    fresh.push(pkt.pkt_num);
                }
                _ => {
                    debug!("packet {} is not in flight, skipped", pkt.pkt_num);
                    resolution.stale += 1;
                }
            }
        }

        self.bytes = self.checked_sub(resolution.bytes)?;
        for pkt_num in fresh {
            self.outstanding.remove(&pkt_num);
        }

        Ok(resolution)
    }

    /// Take bytes out of flight for an event which does not list its
    /// packets.
    ///
    /// The bytes are charged to the packets in flight in packet number
    /// order. Fully charged packets leave flight, a partially charged one
    /// keeps its remaining bytes, so a later report of any of them removes
    /// at most what is left.
    fn on_bytes_resolved(&mut self, bytes: u64) -> Result<Resolution> {
        let bytes_in_flight = self.checked_sub(bytes)?;
        let mut resolution = Resolution {
            bytes,
            ..Default::default()
        };
        if bytes == 0 {
            return Ok(resolution);
        }

        let mut pkt_nums: Vec<u64> = self.outstanding.keys().copied().collect();
        pkt_nums.sort_unstable();

        let mut left = bytes;
        for pkt_num in pkt_nums {
            if left == 0 {
                break;
            }
            let size = match self.outstanding.get_mut(&pkt_num) {
                Some(size) => size,
                None => continue,
            };
            if *size <= left {
                left -= *size;
                self.outstanding.remove(&pkt_num);
                resolution.packets += 1;
            } else {
                *size -= left;
                left = 0;
            }
        }
        self.bytes = bytes_in_flight;

        Ok(resolution)
    }
}
