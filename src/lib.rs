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

//! TCREDIT is a credit-based congestion controller for QUIC transports.
//!
//! Instead of a classical congestion window, the controller keeps a credit
//! balance: every sent byte consumes credit and every acknowledged byte earns
//! credit back, possibly more than was spent. The packet scheduler asks for
//! the writable bytes before each transmission and never sends beyond them.
//!
//! ## Features
//!
//! * **Pluggable growth**: credit is earned either as one datagram per acked
//!   packet or as the acked bytes scaled by a growth factor.
//! * **RTT gating**: growth is withheld while the standing RTT is inflated
//!   above the path's minimum RTT, a sign of self-induced queuing.
//! * **Post-loss skip**: a lightweight cool-down after loss instead of a
//!   multiplicative decrease.
//! * **Bounds**: the credit balance may be clamped into a configured range of
//!   congestion window segments.
//!
//! All variants are expressed as configuration, see [`Config`].
//!
//! ## Example
//!
//! ```
//! use std::time::Instant;
//! use tcredit::congestion_control::*;
//!
//! let conf = tcredit::Config::new();
//! let mut cc = build_congestion_controller(conf.recovery())?;
//! assert_eq!(cc.writable_bytes(), 12000);
//!
//! cc.on_packet_sent(&SentPacket::new(0, 1200))?;
//! assert_eq!(cc.bytes_in_flight(), 1200);
//! assert_eq!(cc.writable_bytes(), 10800);
//!
//! let ack = AckEvent::new(Instant::now(), 0, &[ResolvedPacket::new(0, 1200)]);
//! cc.on_packet_ack_or_loss(Some(&ack), None)?;
//! assert_eq!(cc.bytes_in_flight(), 0);
//! # Ok::<(), tcredit::error::Error>(())
//! ```

use std::cmp;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// The default size of outgoing UDP payloads, which is also the smallest
/// maximum datagram size allowed by QUIC.
const DEFAULT_SEND_UDP_PAYLOAD_SIZE: usize = 1200;

/// The timer granularity, used as the lower bound of configured durations.
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// The default window of the long-term minimum RTT filter.
const DEFAULT_RTT_MIN_FILTER_LEN: Duration = Duration::from_secs(10);

/// The default ratio of the standing RTT over the minimum RTT above which
/// growth is withheld.
const DEFAULT_RTT_INFLATION_THRESHOLD: f64 = 1.1;

/// The default multiplicative growth factor.
const DEFAULT_GROWTH_FACTOR: f64 = 1.05;

/// A specialized [`Result`] type for congestion control operations.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about the credit-based congestion controller.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Configurations about congestion control.
    recovery: RecoveryConfig,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let mut conf = tcredit::Config::new();
    /// conf.set_initial_congestion_window(20);
    /// conf.set_growth_factor(1.1)?;
    /// # Ok::<(), tcredit::error::Error>(())
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from a JSON document. Missing fields take their
    /// default values.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let conf = tcredit::Config::from_json(r#"{
    ///     "growth_algorithm": "fixed_per_ack",
    ///     "loss_skip": { "inflight_below": 2 }
    /// }"#)?;
    /// # Ok::<(), tcredit::error::Error>(())
    /// ```
    pub fn from_json(s: &str) -> Result<Self> {
        let recovery: RecoveryConfig = serde_json::from_str(s)?;
        recovery.validate()?;
        Ok(Self { recovery })
    }

    /// Serialize the configuration into a JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.recovery)?)
    }

    /// Return the configurations about congestion control.
    pub fn recovery(&self) -> &RecoveryConfig {
        &self.recovery
    }

    /// Set the maximum size of outgoing UDP payloads in bytes.
    /// The default and minimum value is `1200`.
    pub fn set_max_datagram_size(&mut self, v: usize) {
        self.recovery.max_datagram_size = cmp::max(v, DEFAULT_SEND_UDP_PAYLOAD_SIZE);
    }

    /// Set the initial credit balance in packets.
    /// The default value is `10`.
    pub fn set_initial_congestion_window(&mut self, packets: u64) {
        self.recovery.initial_congestion_window = packets;
    }

    /// Set the lower bound of the credit balance in packets.
    /// The default value is `2`.
    pub fn set_min_congestion_window(&mut self, packets: u64) {
        self.recovery.min_congestion_window = packets;
    }

    /// Set the upper bound of the credit balance in packets.
    /// The default value is `10000`.
    pub fn set_max_congestion_window(&mut self, packets: u64) {
        self.recovery.max_congestion_window = packets;
    }

    /// Set whether the credit balance is clamped into the range of
    /// `[min_congestion_window, max_congestion_window]` packets.
    /// The default value is true.
    pub fn enable_cwnd_bounds(&mut self, v: bool) {
        self.recovery.enable_cwnd_bounds = v;
    }

    /// Set the credit growth algorithm.
    /// The default value is `GrowthAlgorithm::ScaledByAckedBytes`.
    pub fn set_growth_algorithm(&mut self, v: GrowthAlgorithm) {
        self.recovery.growth_algorithm = v;
    }

    /// Set the factor applied to acked bytes by `ScaledByAckedBytes`.
    /// The default value is `1.05`.
    pub fn set_growth_factor(&mut self, v: f64) -> Result<()> {
        if !v.is_finite() || v < 0.0 {
            return Err(Error::InvalidConfig(format!("growth factor {}", v)));
        }
        self.recovery.growth_factor = v;
        Ok(())
    }

    /// Set whether growth is withheld while the standing RTT is inflated.
    /// The default value is true.
    pub fn enable_rtt_gate(&mut self, v: bool) {
        self.recovery.enable_rtt_gate = v;
    }

    /// Set the window of the minimum RTT filter in milliseconds.
    /// The default value is `10000`.
    pub fn set_rtt_min_filter_len(&mut self, millis: u64) {
        self.recovery.rtt_min_filter_len =
            cmp::max(Duration::from_millis(millis), TIMER_GRANULARITY);
    }

    /// Set the ratio of the standing RTT over the minimum RTT above which
    /// growth is withheld. The value should not be less than `1.0`.
    /// The default value is `1.1`.
    pub fn set_rtt_inflation_threshold(&mut self, v: f64) -> Result<()> {
        if !v.is_finite() || v < 1.0 {
            return Err(Error::InvalidConfig(format!("rtt inflation threshold {}", v)));
        }
        self.recovery.rtt_inflation_threshold = v;
        Ok(())
    }

    /// Set the release condition of the post-loss skip. `None` disables it.
    /// The default value is `None`.
    pub fn set_loss_skip(&mut self, v: Option<SkipRelease>) {
        self.recovery.loss_skip = v;
    }

    /// Set whether lost bytes are also taken off the credit balance.
    /// The default value is false.
    pub fn enable_loss_debits_credit(&mut self, v: bool) {
        self.recovery.loss_debits_credit = v;
    }

    /// Set the value reported as congestion window.
    /// The default value is `CwndSemantics::Disabled`.
    pub fn set_cwnd_semantics(&mut self, v: CwndSemantics) {
        self.recovery.cwnd_semantics = v;
    }
}

/// Configurations about congestion control.
#[doc(hidden)]
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// The maximum size of outgoing UDP payloads.
    pub max_datagram_size: usize,

    /// The initial credit balance in packets.
    pub initial_congestion_window: u64,

    /// The minimal credit balance in packets, if bounds are enabled.
    /// The RECOMMENDED value is 2 * max_datagram_size.
    /// See RFC 9002 Section 7.2
    pub min_congestion_window: u64,

    /// The maximal credit balance in packets, if bounds are enabled.
    pub max_congestion_window: u64,

    /// Clamp the credit balance into the min/max congestion window.
    pub enable_cwnd_bounds: bool,

    /// The credit growth algorithm.
    pub growth_algorithm: GrowthAlgorithm,

    /// The factor applied to acked bytes by `ScaledByAckedBytes`.
    pub growth_factor: f64,

    /// Withhold growth while the standing RTT is inflated.
    pub enable_rtt_gate: bool,

    /// The length of the minimum RTT filter window.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub rtt_min_filter_len: Duration,

    /// The standing/minimum RTT ratio above which growth is withheld.
    pub rtt_inflation_threshold: f64,

    /// Release condition of the post-loss skip, if enabled.
    pub loss_skip: Option<SkipRelease>,

    /// Take lost bytes off the credit balance.
    pub loss_debits_credit: bool,

    /// The value reported as congestion window.
    pub cwnd_semantics: CwndSemantics,
}

impl RecoveryConfig {
    /// Check the configuration for values the controller can not run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size == 0 {
            return Err(Error::InvalidConfig("zero datagram size".into()));
        }
        if self.enable_cwnd_bounds && self.min_congestion_window > self.max_congestion_window {
            return Err(Error::InvalidConfig(format!(
                "min cwnd {} exceeds max cwnd {}",
                self.min_congestion_window, self.max_congestion_window
            )));
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

impl Default for RecoveryConfig {
    fn default() -> RecoveryConfig {
        RecoveryConfig {
            max_datagram_size: DEFAULT_SEND_UDP_PAYLOAD_SIZE,
            initial_congestion_window: 10_u64,
            min_congestion_window: 2_u64,
            max_congestion_window: 10_000_u64,
            enable_cwnd_bounds: true,
            growth_algorithm: GrowthAlgorithm::ScaledByAckedBytes,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            enable_rtt_gate: true,
            rtt_min_filter_len: DEFAULT_RTT_MIN_FILTER_LEN,
            rtt_inflation_threshold: DEFAULT_RTT_INFLATION_THRESHOLD,
            loss_skip: None,
            loss_debits_credit: false,
            cwnd_semantics: CwndSemantics::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .init();
    }

    #[test]
    fn max_datagram_size() {
        let mut config = Config::new();
        assert_eq!(
            config.recovery.max_datagram_size,
            DEFAULT_SEND_UDP_PAYLOAD_SIZE
        );

        config.set_max_datagram_size(500);
        assert_eq!(
            config.recovery.max_datagram_size,
            DEFAULT_SEND_UDP_PAYLOAD_SIZE
        );

        config.set_max_datagram_size(1350);
        assert_eq!(config.recovery.max_datagram_size, 1350);
    }

    #[test]
    fn growth_factor() {
        let mut config = Config::new();
        assert_eq!(config.recovery.growth_factor, DEFAULT_GROWTH_FACTOR);

        assert!(config.set_growth_factor(f64::NAN).is_err());
        assert!(config.set_growth_factor(-1.0).is_err());
        assert_eq!(config.recovery.growth_factor, DEFAULT_GROWTH_FACTOR);

        assert!(config.set_growth_factor(1.1).is_ok());
        assert_eq!(config.recovery.growth_factor, 1.1);
    }

    #[test]
    fn rtt_gate() {
        let mut config = Config::new();
        assert!(config.recovery.enable_rtt_gate);

        config.set_rtt_min_filter_len(0);
        assert_eq!(config.recovery.rtt_min_filter_len, TIMER_GRANULARITY);
        config.set_rtt_min_filter_len(5000);
        assert_eq!(
            config.recovery.rtt_min_filter_len,
            Duration::from_millis(5000)
        );

        assert!(config.set_rtt_inflation_threshold(0.9).is_err());
        assert!(config.set_rtt_inflation_threshold(f64::INFINITY).is_err());
        assert!(config.set_rtt_inflation_threshold(1.25).is_ok());
        assert_eq!(config.recovery.rtt_inflation_threshold, 1.25);

        config.enable_rtt_gate(false);
        assert!(!config.recovery.enable_rtt_gate);
    }

    #[test]
    fn validate() {
        let mut conf = RecoveryConfig::default();
        assert_eq!(conf.validate(), Ok(()));

        conf.min_congestion_window = 20;
        conf.max_congestion_window = 10;
        assert!(conf.validate().is_err());

        // Bounds are not checked when they are not enforced.
        conf.enable_cwnd_bounds = false;
        assert_eq!(conf.validate(), Ok(()));

        conf.max_datagram_size = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn json_config() -> Result<()> {
        let config = Config::from_json(
            r#"{
                "max_datagram_size": 1350,
                "growth_algorithm": "fixed_per_ack",
                "rtt_min_filter_len": 5000,
                "loss_skip": { "ack_count": 3 },
                "cwnd_semantics": "equals_credit"
            }"#,
        )?;
        let recovery = config.recovery();
        assert_eq!(recovery.max_datagram_size, 1350);
        assert_eq!(recovery.growth_algorithm, GrowthAlgorithm::FixedPerAck);
        assert_eq!(recovery.rtt_min_filter_len, Duration::from_millis(5000));
        assert_eq!(recovery.loss_skip, Some(SkipRelease::AckCount(3)));
        assert_eq!(recovery.cwnd_semantics, CwndSemantics::EqualsCredit);
        // Missing fields take default values.
        assert_eq!(recovery.initial_congestion_window, 10);
        assert_eq!(recovery.growth_factor, DEFAULT_GROWTH_FACTOR);

        // Round trip through JSON keeps the configuration.
        let again = Config::from_json(&config.to_json()?)?;
        assert_eq!(again.recovery(), config.recovery());

        assert!(Config::from_json(r#"{ "growth_factor": -2.0 }"#).is_err());
        assert!(Config::from_json(r#"{ "growth_algorithm": "reno" }"#).is_err());
        assert!(Config::from_json("not json").is_err());

        Ok(())
    }
}

pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CwndSemantics;
pub use crate::congestion_control::GrowthAlgorithm;
pub use crate::congestion_control::SkipRelease;
pub use crate::error::Error;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod error;
