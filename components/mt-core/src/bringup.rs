use embassy_time::{Duration, Timer};

use crate::bus::BusError;

/// Bounded identity-read retry for one peripheral during startup.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// Identity reads exhausted without a matching device id. Fatal.
    DeviceNotFound { device: &'static str },
    /// A one-time configuration write failed. Fatal.
    Bus(BusError),
}

impl From<BusError> for InitError {
    fn from(err: BusError) -> Self {
        InitError::Bus(err)
    }
}

/// Retry the identity read until it returns `expected_id` or the policy is
/// exhausted. A read error counts as a failed attempt, not a fatal error;
/// only exhaustion is fatal.
pub async fn detect(
    device: &'static str,
    expected_id: u8,
    policy: RetryPolicy,
    mut read_id: impl AsyncFnMut() -> Result<u8, BusError>,
) -> Result<(), InitError> {
    for attempt in 1..=policy.attempts {
        match read_id().await {
            Ok(id) if id == expected_id => {
                info!("{} found (attempt {})", device, attempt);
                return Ok(());
            }
            Ok(id) => {
                warn!("{} identity mismatch: {:02x} (attempt {})", device, id, attempt);
            }
            Err(e) => {
                warn!("{} identity read failed: {:?} (attempt {})", device, e, attempt);
            }
        }
        if attempt < policy.attempts {
            Timer::after(policy.delay).await;
        }
    }
    error!("{} not found after {} attempts", device, policy.attempts);
    Err(InitError::DeviceNotFound { device })
}
