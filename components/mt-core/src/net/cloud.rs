#![allow(async_fn_in_trait)]

use embassy_sync::{
    blocking_mutex::raw::NoopRawMutex,
    channel::{Channel, Receiver, Sender},
};
use embassy_time::{Duration, Timer};

use crate::telemetry::TelemetryEvent;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);
pub const MIN_RECONNECT_PERIOD: Duration = Duration::from_secs(5);
pub const MAX_RECONNECT_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CloudError {
    /// Provisioning/connect attempt failed. Never fatal, drives the backoff.
    Provisioning,
    /// An accepted session rejected an outbound message.
    Transport,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkHealth {
    Authenticated,
    Deauthenticated,
}

/// The managed session boundary. Transport and authentication live behind
/// this trait; the controller only sequences them.
pub trait CloudLink {
    async fn network_ready(&mut self) -> bool;
    async fn provision(&mut self, scope_id: &str) -> Result<(), CloudError>;
    async fn publish(&mut self, payload: &str) -> Result<(), CloudError>;
    /// Pump the session's internal work queue. Reports whether the session
    /// still considers itself authenticated (the connection-status callback
    /// of the original SDK, folded into a return value).
    async fn pump(&mut self) -> LinkHealth;
}

/// Reconnect interval: seeded at `min` on the first failure after a healthy
/// period, doubled on each further failure, clamped to `max`, reset to
/// `default` on success. Always within `[min, max]` once seeded.
pub struct Backoff {
    default: Duration,
    min: Duration,
    max: Duration,
    current: Duration,
    seeded: bool,
}

impl Backoff {
    pub fn new(default: Duration, min: Duration, max: Duration) -> Self {
        Self {
            default,
            min,
            max,
            current: default,
            seeded: false,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn on_failure(&mut self) -> Duration {
        if self.seeded {
            self.current = core::cmp::min(self.current * 2, self.max);
        } else {
            self.current = self.min;
            self.seeded = true;
        }
        self.current
    }

    pub fn on_success(&mut self) -> Duration {
        self.current = self.default;
        self.seeded = false;
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_PERIOD, MIN_RECONNECT_PERIOD, MAX_RECONNECT_PERIOD)
    }
}

pub struct State<const N: usize> {
    channel: Channel<NoopRawMutex, TelemetryEvent, N>,
}

impl<const N: usize> State<N> {
    pub fn new() -> Self {
        State { channel: Channel::new() }
    }
}

impl<const N: usize> Default for State<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn new<'a, Link: CloudLink, const N: usize>(
    state: &'a mut State<N>,
    link: Link,
    scope_id: &'static str,
) -> (Runner<'a, Link, N>, Sender<'a, NoopRawMutex, TelemetryEvent, N>) {
    (
        Runner {
            controller: Controller {
                link,
                scope_id,
                state: ConnectionState::Disconnected,
                backoff: Backoff::default(),
                events: state.channel.receiver(),
            },
        },
        state.channel.sender(),
    )
}

pub struct Runner<'a, Link: CloudLink, const N: usize> {
    controller: Controller<'a, Link, N>,
}

impl<Link: CloudLink, const N: usize> Runner<'_, Link, N> {
    pub async fn run(mut self) {
        loop {
            self.controller.once().await;
            Timer::after(self.controller.poll_period()).await;
        }
    }
}

pub struct Controller<'a, Link: CloudLink, const N: usize> {
    link: Link,
    scope_id: &'static str,
    state: ConnectionState,
    backoff: Backoff,
    events: Receiver<'a, NoopRawMutex, TelemetryEvent, N>,
}

impl<Link: CloudLink, const N: usize> Controller<'_, Link, N> {
    /// One slow-poll cycle. State transitions happen only here, never
    /// concurrently; connect failures are retried forever.
    pub async fn once(&mut self) {
        if !self.link.network_ready().await {
            trace!("Cloud> network not ready, staying {:?}", self.state);
            return;
        }

        if self.state != ConnectionState::Authenticated {
            self.state = ConnectionState::Connecting;
            match self.link.provision(self.scope_id).await {
                Ok(()) => {
                    self.state = ConnectionState::Authenticated;
                    let period = self.backoff.on_success();
                    info!("Cloud> authenticated, poll period back to {}s", period.as_secs());
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    let period = self.backoff.on_failure();
                    warn!("Cloud> provisioning failed: {:?}, will retry in {}s", e, period.as_secs());
                    return;
                }
            }
        }

        while let Ok(event) = self.events.try_receive() {
            match event.payload() {
                Ok(payload) => {
                    info!("Cloud> sending message: {}", payload.as_str());
                    if let Err(e) = self.link.publish(payload.as_str()).await {
                        warn!("Cloud> failed to hand over message: {:?}", e);
                    }
                }
                Err(e) => warn!("Cloud> dropping unserializable event {}: {:?}", event.key(), e),
            }
        }

        if self.link.pump().await == LinkHealth::Deauthenticated {
            warn!("Cloud> session de-authenticated");
            self.state = ConnectionState::Disconnected;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn poll_period(&self) -> Duration {
        self.backoff.current()
    }
}
