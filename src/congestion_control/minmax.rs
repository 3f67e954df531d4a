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

/*
 * Copyright 2017, Google Inc.
 *
 * Use of this source code is governed by the following BSD-style license:
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions are
 * met:
 *
 *    * Redistributions of source code must retain the above copyright
 * notice, this list of conditions and the following disclaimer.
 *    * Redistributions in binary form must reproduce the above
 * copyright notice, this list of conditions and the following disclaimer
 * in the documentation and/or other materials provided with the
 * distribution.
 *
 *    * Neither the name of Google Inc. nor the names of its
 * contributors may be used to endorse or promote products derived from
 * this software without specific prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
 * "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
 * LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
 * A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
 * OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
 * SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
 * LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
 * DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
 * THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
 * (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */

//! A windowed min estimator, which is based on an algorithm by Kathleen
//! Nichols. Refer to <https://groups.google.com/g/bbr-dev/c/3RTgkzi5ZD8>.
//!
//! The filter tracks the minimum of a stream of timestamped samples over a
//! sliding time window in constant space and time. It keeps the best, 2nd
//! best and 3rd best samples, where the n'th best was taken no earlier than
//! the (n-1)'th best, and the three are spread over the window so that the
//! error stays bounded while samples increase monotonically.
//!
//! A new minimum makes every earlier sample irrelevant, so all three choices
//! restart from it.
//!
//! The credit controller runs two of them over RTT samples in microseconds:
//! one over a long window for the path's minimum RTT, one over a window of
//! the smoothed RTT for the standing RTT.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Sample {
    /// Sample time.
    time: u64,

    /// Sample value.
    value: u64,
}

#[derive(Debug)]
pub struct WindowedMinFilter {
    /// The time window over which the minimum is taken.
    window: u64,

    /// The best, second best and third best samples, if any sample was taken.
    samples: Option<[Sample; 3]>,
}

impl WindowedMinFilter {
    pub fn new(window: u64) -> Self {
        Self {
            window,
            samples: None,
        }
    }

    /// Set the window length. Samples already taken are kept and expire
    /// according to the new length.
    pub fn set_window(&mut self, window: u64) {
        self.window = window;
    }

    /// Return the minimum within the window, or `None` if no sample was
    /// taken yet.
    pub fn get(&self) -> Option<u64> {
        self.samples.map(|s| s[0].value)
    }

    /// Take a new sample. Samples older than the newest one are ignored.
    pub fn update(&mut self, value: u64, time: u64) {
        let sample = Sample { time, value };
        let samples = match self.samples.as_mut() {
            Some(samples) => samples,
            None => {
                self.samples = Some([sample; 3]);
                return;
            }
        };

        if time < samples[2].time {
            return;
        }

        // A new min, or nothing left in the window.
        if value <= samples[0].value || time - samples[2].time > self.window {
            *samples = [sample; 3];
            return;
        }

        if value <= samples[1].value {
            samples[2] = sample;
            samples[1] = sample;
        } else if value <= samples[2].value {
            samples[2] = sample;
        }

        Self::subwin_update(samples, sample, self.window);
    }

    /// As time advances, update the 1st, 2nd and 3rd choices.
    fn subwin_update(samples: &mut [Sample; 3], sample: Sample, window: u64) {
        let dt = sample.time - samples[0].time;
        if dt > window {
            // The best sample expired. Promote the 2nd and 3rd choices, and
            // once more if the new best is out of the window as well.
            samples[0] = samples[1];
            samples[1] = samples[2];
            samples[2] = sample;
            if sample.time - samples[0].time > window {
                samples[0] = samples[1];
                samples[1] = samples[2];
                samples[2] = sample;
            }
        } else if samples[1] == samples[0] && dt > window / 4 {
            // A quarter of the window passed without a new 2nd choice.
            samples[2] = sample;
            samples[1] = sample;
        } else if samples[2] == samples[1] && dt > window / 2 {
            // Half of the window passed without a new 3rd choice.
            samples[2] = sample;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_filter_uninitialized() {
        let mut f = WindowedMinFilter::new(100);
        assert_eq!(f.get(), None);

        f.update(0, 0);
        assert_eq!(f.get(), Some(0));
    }

    #[test]
    fn min_filter_update() {
        let mut f = WindowedMinFilter::new(10);
        assert_eq!(f.window, 10);

        let t: u64 = 20;
        f.update(100, 1);
        assert_eq!(f.get(), Some(100));
        // Nothing left in window.
        f.update(120, t);
        assert_eq!(f.get(), Some(120));
        // Found new min.
        f.update(110, t + 1);
        assert_eq!(f.get(), Some(110));
        // Time goes backwards, ignored.
        f.update(90, t);
        assert_eq!(f.get(), Some(110));
        // A quarter of the window passed, take the 2nd and 3rd choices.
        f.update(120, t + 4);
        assert_eq!(f.get(), Some(110));
        assert_eq!(f.samples.unwrap()[1].value, 120);
        f.update(115, t + 8);
        assert_eq!(f.samples.unwrap()[1].value, 115);
        f.update(120, t + 9);
        assert_eq!(f.samples.unwrap()[2].value, 120);
        f.update(118, t + 10);
        assert_eq!(f.samples.unwrap()[2].value, 118);
        assert_eq!(f.get(), Some(110));
    }

    #[test]
    fn min_filter_expire() {
        let mut f = WindowedMinFilter::new(10);
        f.update(100, 0);
        f.update(150, 3);
        f.update(130, 6);
        assert_eq!(f.get(), Some(100));

        // The best sample falls out of the window, the next best is promoted.
        f.update(140, 11);
        assert_eq!(f.get(), Some(130));

        // Shrinking the window expires faster.
        f.set_window(2);
        f.update(170, 14);
        assert_eq!(f.get(), Some(170));
    }
}
