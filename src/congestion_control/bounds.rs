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

/// Lower and upper bound of the credit balance in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwndBounds {
    /// Minimal congestion window in bytes.
    min: u64,

    /// Maximal congestion window in bytes.
    max: u64,
}

impl CwndBounds {
    /// Create bounds of `[min_segments, max_segments] * max_datagram_size`.
    ///
    /// The upper bound is raised to the lower bound if it is smaller.
    pub fn new(max_datagram_size: u64, min_segments: u64, max_segments: u64) -> Self {
        let min = min_segments.saturating_mul(max_datagram_size);
        let max = max_segments.saturating_mul(max_datagram_size).max(min);
        Self { min, max }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Clamp the given value into the bounds.
    pub fn clamp(&self, value: u64) -> u64 {
        value.clamp(self.min, self.max)
    }
}
