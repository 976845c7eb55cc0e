use embassy_time::Timer;

use crate::bus::{BusError, RegisterBus};
use crate::driver::PollTiming;

/// 7-bit address on the IMU's auxiliary bus.
pub const DEFAULT_ADDRESS: u8 = 0x5C;
pub const DEVICE_ID: u8 = 0xB3;

const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x10;
const CTRL_REG2: u8 = 0x11;
const PRESS_OUT_XL: u8 = 0x28;

const ODR_10HZ: u8 = 0x20;
const BDU: u8 = 0x02;
const SWRESET: u8 = 0x04;

/// Raw pressure LSB per hPa.
const PRESSURE_SCALE: f32 = 4096.0;

/// LPS22HH barometer. Takes any register bus, so the same driver runs over
/// a direct connection or through the IMU's sensor-hub passthrough.
pub struct Lps22hh<B: RegisterBus> {
    bus: B,
    timing: PollTiming,
}

impl<B: RegisterBus> Lps22hh<B> {
    pub fn new(bus: B, timing: PollTiming) -> Self {
        Self { bus, timing }
    }

    pub async fn device_id(&mut self) -> Result<u8, BusError> {
        self.bus.read_byte(WHO_AM_I).await
    }

    /// Software reset with a bounded wait for the reset-complete flag.
    pub async fn reset(&mut self) -> Result<(), BusError> {
        self.bus.write_byte(CTRL_REG2, SWRESET).await?;
        for _ in 0..self.timing.attempts {
            if self.bus.read_byte(CTRL_REG2).await? & SWRESET == 0 {
                return Ok(());
            }
            Timer::after(self.timing.delay).await;
        }
        warn!("LPS22HH: reset flag never cleared");
        Err(BusError::Timeout)
    }

    /// Restore defaults, then block-data-update and the 10 Hz output rate.
    pub async fn configure(&mut self) -> Result<(), BusError> {
        self.reset().await?;
        self.bus.write_byte(CTRL_REG1, ODR_10HZ | BDU).await
    }

    pub async fn read_pressure_raw(&mut self) -> Result<u32, BusError> {
        let mut buf = [0u8; 3];
        self.bus.read(PRESS_OUT_XL, &mut buf).await?;
        Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], 0]))
    }

    pub async fn read_pressure_hpa(&mut self) -> Result<f32, BusError> {
        let raw = self.read_pressure_raw().await?;
        Ok(raw as f32 / PRESSURE_SCALE)
    }
}
