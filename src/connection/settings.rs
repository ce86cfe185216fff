// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Timing configuration of the connection engine.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::Error;
use crate::types::ConnectionMode;

/// Longest accepted interval, timeout or backoff delay.
pub const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Deadline `delay` from now, saturating at roughly thirty years.
pub(crate) fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Exponential backoff between attempts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use applink_lib::connection::BackoffPolicy;
///
/// let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(8))
///     .with_max_attempts(5);
///
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
/// assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(8));
/// assert!(policy.should_retry(4));
/// assert!(!policy.should_retry(5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound of any delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f32,
    /// Total number of attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// Creates an unlimited doubling policy.
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    /// Limits the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Default retry sequence of a single local attempt: 1, 2, 4, 8 s over
    /// five tries.
    #[must_use]
    pub fn local_retry() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(8)).with_max_attempts(5)
    }

    /// Default steady-state reconnect loop: 5 s doubling up to 5 minutes,
    /// forever.
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }

    /// Calculates the delay following the failed attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let multiplier = self
            .multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        // Saturating float-to-int cast; infinities clamp to u64::MAX.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }

    /// Returns true if attempt number `attempts` (0-based) may be made.
    #[must_use]
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Polling cadences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// Interval of `REQUEST-CURRENT-STATE`.
    pub state_interval: Duration,
    /// Interval of the environmental sensor request.
    pub environment_interval: Duration,
    /// Interval of `REQUEST-CURRENT-FAULTS`.
    pub fault_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            state_interval: Duration::from_secs(10),
            environment_interval: Duration::from_secs(30),
            fault_interval: Duration::from_secs(60),
        }
    }
}

/// All tunables of one device engine.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use applink_lib::connection::EngineSettings;
///
/// let settings = EngineSettings::default()
///     .with_state_poll_interval(Duration::from_secs(5))
///     .with_preferred_retry_interval(Duration::from_secs(120));
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Bound on one local connect attempt.
    pub local_connect_timeout: Duration,
    /// Bound on one cloud connect attempt. Must exceed the local bound.
    pub cloud_connect_timeout: Duration,
    /// Bound on a command publish over the local broker.
    pub local_command_timeout: Duration,
    /// Bound on a command publish over the cloud proxy.
    pub cloud_command_timeout: Duration,
    /// Retries inside a single local attempt.
    pub local_retry: BackoffPolicy,
    /// Background loop after a whole cycle failed.
    pub reconnect: BackoffPolicy,
    /// Period of the return-to-preferred probe while in fallback.
    pub preferred_retry_interval: Duration,
    /// MQTT keep-alive.
    pub keep_alive: Duration,
    /// Capacity of the incoming frame queue.
    pub frame_queue_capacity: usize,
    /// Polling cadences.
    pub polling: PollSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            local_connect_timeout: Duration::from_secs(10),
            cloud_connect_timeout: Duration::from_secs(30),
            local_command_timeout: Duration::from_secs(5),
            cloud_command_timeout: Duration::from_secs(15),
            local_retry: BackoffPolicy::local_retry(),
            reconnect: BackoffPolicy::reconnect(),
            preferred_retry_interval: Duration::from_secs(300),
            keep_alive: Duration::from_secs(30),
            frame_queue_capacity: 64,
            polling: PollSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Sets both connect timeouts.
    #[must_use]
    pub fn with_connect_timeouts(mut self, local: Duration, cloud: Duration) -> Self {
        self.local_connect_timeout = local;
        self.cloud_connect_timeout = cloud;
        self
    }

    /// Sets both command timeouts.
    #[must_use]
    pub fn with_command_timeouts(mut self, local: Duration, cloud: Duration) -> Self {
        self.local_command_timeout = local;
        self.cloud_command_timeout = cloud;
        self
    }

    /// Sets the local retry sequence.
    #[must_use]
    pub fn with_local_retry(mut self, policy: BackoffPolicy) -> Self {
        self.local_retry = policy;
        self
    }

    /// Sets the background reconnect loop.
    #[must_use]
    pub fn with_reconnect(mut self, policy: BackoffPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the return-to-preferred probe period.
    #[must_use]
    pub fn with_preferred_retry_interval(mut self, interval: Duration) -> Self {
        self.preferred_retry_interval = interval;
        self
    }

    /// Sets the `REQUEST-CURRENT-STATE` interval.
    #[must_use]
    pub fn with_state_poll_interval(mut self, interval: Duration) -> Self {
        self.polling.state_interval = interval;
        self
    }

    /// Sets all polling cadences.
    #[must_use]
    pub fn with_polling(mut self, polling: PollSettings) -> Self {
        self.polling = polling;
        self
    }

    /// Connect timeout for `mode`.
    #[must_use]
    pub fn connect_timeout(&self, mode: ConnectionMode) -> Duration {
        match mode {
            ConnectionMode::Local => self.local_connect_timeout,
            ConnectionMode::Cloud => self.cloud_connect_timeout,
        }
    }

    /// Command timeout for `mode`.
    #[must_use]
    pub fn command_timeout(&self, mode: ConnectionMode) -> Duration {
        match mode {
            ConnectionMode::Local => self.local_command_timeout,
            ConnectionMode::Cloud => self.cloud_command_timeout,
        }
    }

    /// Checks the settings for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if an interval or timeout is
    /// zero or longer than [`MAX_INTERVAL`], or if cloud timeouts are not
    /// longer than local ones. Malformed backoff policies, a keep-alive
    /// MQTT cannot express and an empty frame queue are rejected as well.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: &str| Err(Error::InvalidConfiguration(reason.to_string()));

        let durations = [
            ("local connect timeout", self.local_connect_timeout),
            ("cloud connect timeout", self.cloud_connect_timeout),
            ("local command timeout", self.local_command_timeout),
            ("cloud command timeout", self.cloud_command_timeout),
            ("preferred retry interval", self.preferred_retry_interval),
            ("keep-alive", self.keep_alive),
            ("state poll interval", self.polling.state_interval),
            ("environment poll interval", self.polling.environment_interval),
            ("fault poll interval", self.polling.fault_interval),
        ];
        for (name, duration) in durations {
            check_duration(name, duration)?;
        }
        if self.cloud_connect_timeout <= self.local_connect_timeout {
            return invalid("cloud connect timeout must be longer than local connect timeout");
        }
        if self.cloud_command_timeout <= self.local_command_timeout {
            return invalid("cloud command timeout must be longer than local command timeout");
        }
        if self.keep_alive < Duration::from_secs(1)
            || self.keep_alive > Duration::from_secs(u64::from(u16::MAX))
        {
            return invalid("keep-alive must be between 1 and 65535 s");
        }
        self.local_retry.validate("local retry")?;
        self.reconnect.validate("reconnect")?;
        if self.frame_queue_capacity == 0 {
            return invalid("frame queue capacity must be non-zero");
        }
        Ok(())
    }
}

fn check_duration(name: &str, duration: Duration) -> Result<(), Error> {
    if duration.is_zero() {
        return Err(Error::InvalidConfiguration(format!("{name} must be non-zero")));
    }
    if duration > MAX_INTERVAL {
        return Err(Error::InvalidConfiguration(format!(
            "{name} must not exceed {} s",
            MAX_INTERVAL.as_secs()
        )));
    }
    Ok(())
}

impl BackoffPolicy {
    fn validate(&self, name: &str) -> Result<(), Error> {
        check_duration(&format!("{name} initial delay"), self.initial_delay)?;
        check_duration(&format!("{name} max delay"), self.max_delay)?;
        if self.initial_delay > self.max_delay {
            return Err(Error::InvalidConfiguration(format!(
                "{name} initial delay must not exceed its max delay"
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfiguration(format!(
                "{name} multiplier must be a finite number of at least 1"
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(Error::InvalidConfiguration(format!(
                "{name} must allow at least one attempt"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_retry_sequence() {
        let policy = BackoffPolicy::local_retry();
        let delays: Vec<u64> = (0..4).map(|n| policy.delay_for_attempt(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn reconnect_is_capped_and_unlimited() {
        let policy = BackoffPolicy::reconnect();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(300));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(300));
        assert!(policy.should_retry(u32::MAX - 1));
    }

    #[test]
    fn defaults_are_valid() {
        let settings = EngineSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.cloud_connect_timeout > settings.local_connect_timeout);
        assert_eq!(settings.preferred_retry_interval, Duration::from_secs(300));
        assert_eq!(settings.polling.state_interval, Duration::from_secs(10));
        assert_eq!(
            settings.connect_timeout(ConnectionMode::Cloud),
            Duration::from_secs(30)
        );
        assert_eq!(
            settings.command_timeout(ConnectionMode::Local),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn cloud_timeout_must_exceed_local() {
        let settings = EngineSettings::default()
            .with_connect_timeouts(Duration::from_secs(10), Duration::from_secs(10));
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let settings = EngineSettings::default().with_state_poll_interval(Duration::ZERO);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("state poll interval"));

        let settings = EngineSettings::default()
            .with_local_retry(BackoffPolicy::local_retry().with_max_attempts(0));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn oversized_intervals_are_rejected() {
        let settings = EngineSettings::default().with_preferred_retry_interval(Duration::MAX);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("preferred retry interval"));

        let settings = EngineSettings::default()
            .with_reconnect(BackoffPolicy::new(Duration::from_secs(5), Duration::MAX));
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("reconnect max delay"));

        let settings = EngineSettings::default().with_preferred_retry_interval(MAX_INTERVAL);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn malformed_backoff_is_rejected() {
        let cases = [
            (BackoffPolicy::new(Duration::ZERO, Duration::ZERO), "initial delay"),
            (
                BackoffPolicy::new(Duration::from_millis(100), Duration::ZERO),
                "max delay",
            ),
            (
                BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(1)),
                "must not exceed its max delay",
            ),
            (
                BackoffPolicy::reconnect().with_multiplier(f32::NAN),
                "multiplier",
            ),
            (
                BackoffPolicy::reconnect().with_multiplier(f32::INFINITY),
                "multiplier",
            ),
            (BackoffPolicy::reconnect().with_multiplier(0.5), "multiplier"),
        ];
        for (policy, reason) in cases {
            let err = EngineSettings::default()
                .with_reconnect(policy.clone())
                .validate()
                .unwrap_err();
            assert!(err.to_string().contains(reason), "{policy:?}: {err}");

            let err = EngineSettings::default()
                .with_local_retry(policy)
                .validate()
                .unwrap_err();
            assert!(err.to_string().contains("local retry"), "{err}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_saturates_instead_of_overflowing() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(5)), now + Duration::from_secs(5));
        assert!(deadline_after(Duration::MAX) > now + MAX_INTERVAL);
    }
}
