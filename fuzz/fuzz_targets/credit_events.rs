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

#![no_main]

use std::time::Duration;
use std::time::Instant;

use libfuzzer_sys::fuzz_target;

use tcredit::congestion_control::*;
use tcredit::Config;
use tcredit::SkipRelease;

// Every three bytes are one event: an opcode, a packet number and a size.
// Reports for any packet number are allowed, so duplicated and unknown
// packets are exercised as well, mixed with events which only carry a byte
// count. The bytes in flight must always match the bytes sent minus the
// bytes resolved.
fuzz_target!(|data: &[u8]| {
    let mut conf = Config::new();
    match data.first().map(|b| b % 3) {
        Some(0) => conf.set_loss_skip(Some(SkipRelease::AckCount(2))),
        Some(1) => conf.set_loss_skip(Some(SkipRelease::InflightBelow(2))),
        _ => conf.enable_cwnd_bounds(false),
    }
    let mut cc = build_congestion_controller(conf.recovery()).unwrap();

    let mut now = Instant::now();
    let mut sizes = [0_u64; 256];
    let mut inflight = 0_u64;

    for ev in data.chunks_exact(3) {
        let (op, pn, size) = (ev[0], ev[1] as u64, ev[2] as u64 * 8);
        now += Duration::from_millis(1);
        let pkt = ResolvedPacket::new(pn, size);

        match op % 6 {
            0 => {
                let res = cc.on_packet_sent(&SentPacket::new(pn, size));
                if size == 0 {
                    res.unwrap();
                } else if sizes[pn as usize] == 0 {
                    res.unwrap();
                    sizes[pn as usize] = size;
                    inflight += size;
                } else {
                    assert!(res.is_err());
                }
            }
            1 => {
                let rtt = RttSample::new(
                    Duration::from_millis(10 + op as u64 / 4),
                    Duration::from_millis(20),
                );
                let ack = AckEvent::new(now, pn, &[pkt]).with_rtt(rtt);
                cc.on_packet_ack_or_loss(Some(&ack), None).unwrap();
                inflight -= std::mem::take(&mut sizes[pn as usize]);
            }
            2 => {
                cc.on_packet_ack_or_loss(None, Some(&LossEvent::new(&[pkt])))
                    .unwrap();
                inflight -= std::mem::take(&mut sizes[pn as usize]);
            }
            3 => {
                cc.on_packets_discarded(&[pkt]).unwrap();
                inflight -= std::mem::take(&mut sizes[pn as usize]);
            }
            _ => {
                // Bytes without packet list, charged from the lowest packet
                // number up.
                let bytes = size.min(inflight);
                if op % 2 == 0 {
                    let mut ack = AckEvent::new(now, pn, &[]);
                    ack.acked_bytes = bytes;
                    cc.on_packet_ack_or_loss(Some(&ack), None).unwrap();
                } else {
                    let mut loss = LossEvent::new(&[]);
                    loss.lost_bytes = bytes;
                    cc.on_packet_ack_or_loss(None, Some(&loss)).unwrap();
                }
                inflight -= bytes;

                let mut left = bytes;
                for s in sizes.iter_mut() {
                    let taken = left.min(*s);
                    *s -= taken;
                    left -= taken;
                }
            }
        }

        assert_eq!(cc.bytes_in_flight(), inflight);
    }
});
