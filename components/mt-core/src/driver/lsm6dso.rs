use embassy_time::Timer;

use crate::bus::{BusError, RegisterBus};
use crate::driver::PollTiming;

pub const DEFAULT_ADDRESS: u8 = 0x6A;
pub const DEVICE_ID: u8 = 0x6C;

/// Sensitivity for the +/-2g range, in milli-g per LSB.
const ACCEL_SENSITIVITY_2G: f32 = 0.061;

// Main register bank.
const FUNC_CFG_ACCESS: u8 = 0x01;
const WHO_AM_I: u8 = 0x0F;
const CTRL1_XL: u8 = 0x10;
const CTRL3_C: u8 = 0x12;
const STATUS_REG: u8 = 0x1E;
const OUTX_L_A: u8 = 0x28;
const STATUS_MASTER_MAINPAGE: u8 = 0x39;

// Sensor-hub register bank, reachable while SHUB_REG_ACCESS is set.
const SENSOR_HUB_1: u8 = 0x02;
const MASTER_CONFIG: u8 = 0x14;
const SLV0_ADD: u8 = 0x15;
const SLV0_SUBADD: u8 = 0x16;
const SLV0_CONFIG: u8 = 0x17;
const DATAWRITE_SLV0: u8 = 0x21;

const SHUB_REG_ACCESS: u8 = 0x40;
const SW_RESET: u8 = 0x01;
const IF_INC: u8 = 0x04;
const BDU: u8 = 0x40;
const XLDA: u8 = 0x01;
const SENS_HUB_ENDOP: u8 = 0x01;
const MASTER_ON: u8 = 0x04;
const SHUB_PU_EN: u8 = 0x08;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRate {
    Off = 0x00,
    Hz104 = 0x40,
}

/// LSM6DSO IMU on the direct bus. Besides the accelerometer it owns the
/// sensor-hub master that relays register access to the barometer on its
/// auxiliary bus.
pub struct Lsm6dso<B: RegisterBus> {
    bus: B,
    timing: PollTiming,
}

impl<B: RegisterBus> Lsm6dso<B> {
    pub fn new(bus: B, timing: PollTiming) -> Self {
        Self { bus, timing }
    }

    pub async fn device_id(&mut self) -> Result<u8, BusError> {
        self.bus.read_byte(WHO_AM_I).await
    }

    /// Software reset with a bounded wait for the reset-complete flag.
    pub async fn reset(&mut self) -> Result<(), BusError> {
        self.bus.write_byte(CTRL3_C, SW_RESET).await?;
        self.wait_flag_clear(CTRL3_C, SW_RESET).await
    }

    pub async fn configure(&mut self) -> Result<(), BusError> {
        self.reset().await?;
        self.bus.write_byte(CTRL3_C, IF_INC | BDU).await?;
        self.set_accel_rate(AccelRate::Hz104).await
    }

    pub async fn set_accel_rate(&mut self, rate: AccelRate) -> Result<(), BusError> {
        self.bus.write_byte(CTRL1_XL, rate as u8).await
    }

    pub async fn read_accel_raw(&mut self) -> Result<[i16; 3], BusError> {
        let mut buf = [0u8; 6];
        self.bus.read(OUTX_L_A, &mut buf).await?;
        Ok([
            i16::from_le_bytes([buf[0], buf[1]]),
            i16::from_le_bytes([buf[2], buf[3]]),
            i16::from_le_bytes([buf[4], buf[5]]),
        ])
    }

    pub async fn read_accel_mg(&mut self) -> Result<[f32; 3], BusError> {
        let raw = self.read_accel_raw().await?;
        Ok([
            raw[0] as f32 * ACCEL_SENSITIVITY_2G,
            raw[1] as f32 * ACCEL_SENSITIVITY_2G,
            raw[2] as f32 * ACCEL_SENSITIVITY_2G,
        ])
    }

    /// Enable the internal pull-ups of the auxiliary bus.
    pub async fn hub_pull_up_enable(&mut self) -> Result<(), BusError> {
        let config = self.hub_read_byte(MASTER_CONFIG).await?;
        self.hub_write_byte(MASTER_CONFIG, config | SHUB_PU_EN).await
    }

    /// Relay one register write to the slave behind the sensor hub.
    ///
    /// Datasheet sequence: stage address/sub-address/data in slave slot 0,
    /// enable the hub master, kick the accelerometer to trigger the hub
    /// cycle, wait for data-ready and then end-of-operation, tear down.
    pub async fn passthrough_write(&mut self, slave_address: u8, reg: u8, value: u8) -> Result<(), BusError> {
        self.hub_write_byte(SLV0_ADD, slave_address << 1).await?;
        self.hub_write_byte(SLV0_SUBADD, reg).await?;
        self.hub_write_byte(DATAWRITE_SLV0, value).await?;

        self.run_hub_cycle().await?;

        Ok(())
    }

    /// Relay a register read from the slave behind the sensor hub. The hub
    /// transfers one byte per cycle, so multi-byte reads repeat the whole
    /// sequence with an incremented sub-address.
    pub async fn passthrough_read(&mut self, slave_address: u8, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        for (i, slot) in buf.iter_mut().enumerate() {
            self.hub_write_byte(SLV0_ADD, (slave_address << 1) | 0x01).await?;
            self.hub_write_byte(SLV0_SUBADD, reg + i as u8).await?;
            self.hub_write_byte(SLV0_CONFIG, 0x01).await?;

            self.run_hub_cycle().await?;

            *slot = self.hub_read_byte(SENSOR_HUB_1).await?;
        }
        // Leave the accelerometer running for the regular sampling path.
        self.set_accel_rate(AccelRate::Hz104).await?;
        Ok(())
    }

    /// One triggered hub transaction: master on, accelerometer as trigger,
    /// bounded waits on XLDA and SENS_HUB_ENDOP, master off again.
    async fn run_hub_cycle(&mut self) -> Result<(), BusError> {
        self.set_accel_rate(AccelRate::Off).await?;
        let config = self.hub_read_byte(MASTER_CONFIG).await?;
        self.hub_write_byte(MASTER_CONFIG, config | MASTER_ON).await?;
        self.set_accel_rate(AccelRate::Hz104).await?;

        // Flush a stale sample before watching the data-ready flag.
        self.read_accel_raw().await?;
        self.wait_flag_set(STATUS_REG, XLDA).await?;
        self.wait_flag_set(STATUS_MASTER_MAINPAGE, SENS_HUB_ENDOP).await?;

        let config = self.hub_read_byte(MASTER_CONFIG).await?;
        self.hub_write_byte(MASTER_CONFIG, config & !MASTER_ON).await?;
        self.set_accel_rate(AccelRate::Off).await
    }

    async fn hub_read_byte(&mut self, reg: u8) -> Result<u8, BusError> {
        self.bus.write_byte(FUNC_CFG_ACCESS, SHUB_REG_ACCESS).await?;
        let result = self.bus.read_byte(reg).await;
        self.bus.write_byte(FUNC_CFG_ACCESS, 0x00).await?;
        result
    }

    async fn hub_write_byte(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.bus.write_byte(FUNC_CFG_ACCESS, SHUB_REG_ACCESS).await?;
        let result = self.bus.write_byte(reg, value).await;
        self.bus.write_byte(FUNC_CFG_ACCESS, 0x00).await?;
        result
    }

    async fn wait_flag_set(&mut self, reg: u8, mask: u8) -> Result<(), BusError> {
        for _ in 0..self.timing.attempts {
            if self.bus.read_byte(reg).await? & mask != 0 {
                return Ok(());
            }
            Timer::after(self.timing.delay).await;
        }
        warn!("LSM6DSO: flag {:02x}/{:02x} never set", reg, mask);
        Err(BusError::Timeout)
    }

    async fn wait_flag_clear(&mut self, reg: u8, mask: u8) -> Result<(), BusError> {
        for _ in 0..self.timing.attempts {
            if self.bus.read_byte(reg).await? & mask == 0 {
                return Ok(());
            }
            Timer::after(self.timing.delay).await;
        }
        warn!("LSM6DSO: flag {:02x}/{:02x} never cleared", reg, mask);
        Err(BusError::Timeout)
    }
}

/// Register access to the part wired to the IMU's auxiliary bus. Implements
/// the same capability as a direct bus handle, so the barometer driver does
/// not know it sits behind the hub.
pub struct SensorHub<'a, B: RegisterBus> {
    imu: &'a mut Lsm6dso<B>,
    slave_address: u8,
}

impl<'a, B: RegisterBus> SensorHub<'a, B> {
    pub fn new(imu: &'a mut Lsm6dso<B>, slave_address: u8) -> Self {
        Self { imu, slave_address }
    }
}

impl<B: RegisterBus> RegisterBus for SensorHub<'_, B> {
    async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.imu.passthrough_read(self.slave_address, reg, buf).await
    }

    async fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        for (i, byte) in data.iter().enumerate() {
            self.imu.passthrough_write(self.slave_address, reg + i as u8, *byte).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use embassy_time::Duration;

    use super::*;

    /// Fake with both register banks. Flags read as already set so hub
    /// cycles complete on the first poll; SW_RESET self-clears after one
    /// read unless `sticky_reset` is set.
    struct FakeImuBus {
        main: [u8; 0x40],
        hub: [u8; 0x40],
        banked: bool,
        hub_data: u8,
        sticky_reset: bool,
    }

    impl FakeImuBus {
        fn new() -> Self {
            let mut main = [0u8; 0x40];
            main[WHO_AM_I as usize] = DEVICE_ID;
            main[STATUS_REG as usize] = XLDA;
            main[STATUS_MASTER_MAINPAGE as usize] = SENS_HUB_ENDOP;
            Self {
                main,
                hub: [0u8; 0x40],
                banked: false,
                hub_data: 0,
                sticky_reset: false,
            }
        }
    }

    impl RegisterBus for FakeImuBus {
        async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
            let bank = if self.banked { &self.hub } else { &self.main };
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = bank[reg as usize + i];
            }
            if !self.banked && reg == CTRL3_C && !self.sticky_reset {
                self.main[CTRL3_C as usize] &= !SW_RESET;
            }
            Ok(())
        }

        async fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
            if reg == FUNC_CFG_ACCESS {
                self.banked = data[0] == SHUB_REG_ACCESS;
                return Ok(());
            }
            let bank = if self.banked { &mut self.hub } else { &mut self.main };
            for (i, byte) in data.iter().enumerate() {
                bank[reg as usize + i] = *byte;
            }
            // A staged read slot makes the next hub cycle deliver data.
            if self.banked && reg == SLV0_CONFIG {
                self.hub[SENSOR_HUB_1 as usize] = self.hub_data;
            }
            Ok(())
        }
    }

    fn fast_timing() -> PollTiming {
        PollTiming {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn identity_read() {
        let mut imu = Lsm6dso::new(FakeImuBus::new(), fast_timing());
        assert_eq!(imu.device_id().await.unwrap(), DEVICE_ID);
    }

    #[tokio::test]
    async fn reset_completes_when_flag_clears() {
        let mut imu = Lsm6dso::new(FakeImuBus::new(), fast_timing());
        imu.reset().await.unwrap();
        assert_eq!(imu.bus.main[CTRL3_C as usize] & SW_RESET, 0);
    }

    #[tokio::test]
    async fn reset_times_out_when_flag_sticks() {
        let mut bus = FakeImuBus::new();
        bus.sticky_reset = true;
        let mut imu = Lsm6dso::new(bus, fast_timing());
        assert_eq!(imu.reset().await, Err(BusError::Timeout));
    }

    #[tokio::test]
    async fn accel_raw_is_little_endian_triplet() {
        let mut bus = FakeImuBus::new();
        bus.main[OUTX_L_A as usize..OUTX_L_A as usize + 6].copy_from_slice(&[0x10, 0x00, 0x00, 0x80, 0xFF, 0x7F]);
        let mut imu = Lsm6dso::new(bus, fast_timing());
        assert_eq!(imu.read_accel_raw().await.unwrap(), [16, i16::MIN, i16::MAX]);
    }

    #[tokio::test]
    async fn passthrough_read_stages_slave_and_returns_hub_data() {
        let mut bus = FakeImuBus::new();
        bus.hub_data = 0xB3;
        let mut imu = Lsm6dso::new(bus, fast_timing());

        let mut hub = SensorHub::new(&mut imu, 0x5C);
        assert_eq!(hub.read_byte(0x0F).await.unwrap(), 0xB3);

        assert_eq!(imu.bus.hub[SLV0_ADD as usize], (0x5C << 1) | 0x01);
        assert_eq!(imu.bus.hub[SLV0_SUBADD as usize], 0x0F);
        // The regular sampling path is restored afterwards.
        assert_eq!(imu.bus.main[CTRL1_XL as usize], AccelRate::Hz104 as u8);
    }

    #[tokio::test]
    async fn passthrough_write_stages_data_byte() {
        let mut imu = Lsm6dso::new(FakeImuBus::new(), fast_timing());

        let mut hub = SensorHub::new(&mut imu, 0x5C);
        hub.write_byte(0x10, 0x22).await.unwrap();

        assert_eq!(imu.bus.hub[SLV0_ADD as usize], 0x5C << 1);
        assert_eq!(imu.bus.hub[SLV0_SUBADD as usize], 0x10);
        assert_eq!(imu.bus.hub[DATAWRITE_SLV0 as usize], 0x22);
        // Master switched off after the cycle.
        assert_eq!(imu.bus.hub[MASTER_CONFIG as usize] & MASTER_ON, 0);
    }
}
