use embassy_futures::select::{Either, select};
use embassy_sync::{
    blocking_mutex::raw::NoopRawMutex,
    channel::{Receiver, Sender},
};

use crate::input::{ChannelId, InputEvent};
use crate::sensor::environment::Reading;
use crate::telemetry::{TelemetryEvent, VALUE_SIZE};

/// Running vote totals: every press of a mood button counts with its weight.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoteTally {
    pub happy: u32,
    pub meh: u32,
    pub mad: u32,
}

impl VoteTally {
    fn record(&mut self, channel: ChannelId) {
        match channel {
            ChannelId::Happy => self.happy += 1,
            ChannelId::Meh => self.meh += 1,
            ChannelId::Mad => self.mad += 1,
            ChannelId::Proximity => {}
        }
    }

    pub fn score(&self) -> u32 {
        self.happy * u32::from(ChannelId::Happy.vote()) + self.meh * u32::from(ChannelId::Meh.vote()) + self.mad * u32::from(ChannelId::Mad.vote())
    }
}

pub fn new<'a, const NI: usize, const NR: usize, const NT: usize>(
    inputs: Receiver<'a, NoopRawMutex, InputEvent, NI>,
    readings: Receiver<'a, NoopRawMutex, Reading, NR>,
    telemetry: Sender<'a, NoopRawMutex, TelemetryEvent, NT>,
) -> Runner<'a, NI, NR, NT> {
    Runner {
        inputs,
        readings,
        telemetry,
        tally: VoteTally::default(),
    }
}

/// Fans input events and sensor averages into the cloud telemetry queue.
pub struct Runner<'a, const NI: usize, const NR: usize, const NT: usize> {
    inputs: Receiver<'a, NoopRawMutex, InputEvent, NI>,
    readings: Receiver<'a, NoopRawMutex, Reading, NR>,
    telemetry: Sender<'a, NoopRawMutex, TelemetryEvent, NT>,
    tally: VoteTally,
}

impl<const NI: usize, const NR: usize, const NT: usize> Runner<'_, NI, NR, NT> {
    pub async fn run(mut self) {
        loop {
            self.once().await;
        }
    }

    pub async fn once(&mut self) {
        match select(self.inputs.receive(), self.readings.receive()).await {
            Either::First(event) => self.handle_input(event).await,
            Either::Second(reading) => self.handle_reading(reading).await,
        }
    }

    async fn handle_input(&mut self, event: InputEvent) {
        let telemetry = match event {
            InputEvent::Expander { channel, pressed } => {
                if pressed {
                    self.tally.record(channel);
                    info!("Button Pressed: {} (score {})", channel.label(), self.tally.score());
                } else {
                    info!("Button Released: {}", channel.label());
                }
                TelemetryEvent::flag(channel.label(), pressed)
            }
            InputEvent::ButtonA => {
                info!("Button pressed");
                TelemetryEvent::flag("ButtonPress", true)
            }
            InputEvent::ButtonB => {
                info!("Orientation button pressed");
                TelemetryEvent::flag("OrientationPress", true)
            }
        };
        match telemetry {
            Ok(event) => self.telemetry.send(event).await,
            Err(e) => warn!("unable to build telemetry event: {:?}", e),
        }
    }

    async fn handle_reading(&mut self, reading: Reading) {
        info!("Env.Reading> {:?}", reading);
        let value: Result<heapless::String<VALUE_SIZE>, _> = heapless::format!("{:.1}", reading.pressure_hpa);
        let telemetry = match value {
            Ok(value) => TelemetryEvent::new("Pressure", &value),
            Err(_) => {
                warn!("unable to format pressure value");
                return;
            }
        };
        match telemetry {
            Ok(event) => self.telemetry.send(event).await,
            Err(e) => warn!("unable to build telemetry event: {:?}", e),
        }
    }

    pub fn tally(&self) -> VoteTally {
        self.tally
    }
}
