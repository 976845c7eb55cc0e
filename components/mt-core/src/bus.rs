#![allow(async_fn_in_trait)]

use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embedded_hal_async::i2c::I2c;

use crate::LoggingMutexGuard;

const WRITE_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// A single register transaction failed on the wire. Retryable.
    TransientIo,
    /// A bounded wait on a device completion flag ran out of attempts.
    Timeout,
}

/// A thing you can read registers from and write registers to, regardless of
/// whether the device sits on the I2C bus directly or behind the IMU's
/// sensor-hub passthrough.
pub trait RegisterBus {
    async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError>;
    async fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError>;

    async fn read_byte(&mut self, reg: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.read(reg, &mut buf).await?;
        Ok(buf[0])
    }

    async fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.write(reg, &[value]).await
    }
}

/// Register access for one device address on an I2C bus shared between
/// multiple devices. Locks the bus per transaction.
pub struct SharedI2cBus<'a, I2C: I2c> {
    bus: &'a Mutex<NoopRawMutex, I2C>,
    address: u8,
    tag: &'static str,
}

impl<'a, I2C: I2c> SharedI2cBus<'a, I2C> {
    pub fn new(bus: &'a Mutex<NoopRawMutex, I2C>, address: u8, tag: &'static str) -> Self {
        Self { bus, address, tag }
    }

    async fn lock(&self) -> LoggingMutexGuard<'a, NoopRawMutex, I2C> {
        LoggingMutexGuard::new(self.bus, self.tag).await
    }
}

impl<I2C: I2c> RegisterBus for SharedI2cBus<'_, I2C> {
    async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        let mut bus = self.lock().await;
        match bus.write_read(self.address, &[reg], buf).await {
            Ok(()) => {
                trace!("I2C[{}].RD> {:02x} => {:?}", self.tag, reg, buf);
                Ok(())
            }
            Err(_e) => {
                warn!("I2C[{}].RD> {:02x} failed", self.tag, reg);
                Err(BusError::TransientIo)
            }
        }
    }

    async fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        let mut frame = heapless::Vec::<u8, WRITE_BUFFER_SIZE>::new();
        if frame.push(reg).is_err() || frame.extend_from_slice(data).is_err() {
            error!("I2C[{}].WR> {:02x} frame too large ({} bytes)", self.tag, reg, data.len());
            return Err(BusError::TransientIo);
        }
        let mut bus = self.lock().await;
        match bus.write(self.address, &frame).await {
            Ok(()) => {
                trace!("I2C[{}].WR> {:02x} <= {:?}", self.tag, reg, data);
                Ok(())
            }
            Err(_e) => {
                warn!("I2C[{}].WR> {:02x} failed", self.tag, reg);
                Err(BusError::TransientIo)
            }
        }
    }
}
