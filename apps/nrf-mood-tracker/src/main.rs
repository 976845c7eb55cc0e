#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::join::join5;
use embassy_nrf::{
    bind_interrupts,
    gpio::{Input, Level, Output, OutputDrive, Pull},
    peripherals,
    twim::{self, Twim},
};
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use mt_core::bringup::{self, InitError, RetryPolicy};
use mt_core::bus::{RegisterBus, SharedI2cBus};
use mt_core::driver::PollTiming;
use mt_core::driver::lps22hh::{self, Lps22hh};
use mt_core::driver::lsm6dso::{self, Lsm6dso, SensorHub};
use mt_core::driver::mcp23017::{self, Mcp23017};
use mt_core::net::cloud::{self, CloudError, CloudLink, LinkHealth};
use mt_core::{input, mood_tracker, sensor};

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const REPORT_INTERVAL: Duration = Duration::from_secs(60);

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

/// Session placeholder that accepts everything and logs outbound payloads.
// TODO: replace with the MQTT-backed session once the IoT hub backend is
// provisioned for this board.
struct DebugUplink;

impl CloudLink for DebugUplink {
    async fn network_ready(&mut self) -> bool {
        true
    }

    async fn provision(&mut self, scope_id: &str) -> Result<(), CloudError> {
        info!("Uplink> provisioned with scope {}", scope_id);
        Ok(())
    }

    async fn publish(&mut self, payload: &str) -> Result<(), CloudError> {
        info!("Uplink> {}", payload);
        Ok(())
    }

    async fn pump(&mut self) -> LinkHealth {
        LinkHealth::Authenticated
    }
}

/// The original bring-up order: expander first, then the IMU, then the
/// barometer through the IMU's sensor hub. Any failure here is fatal.
async fn init_peripherals<B1: RegisterBus, B2: RegisterBus>(
    expander: &mut Mcp23017<B1>,
    imu: &mut Lsm6dso<B2>,
    policy: RetryPolicy,
    timing: PollTiming,
) -> Result<(), InitError> {
    bringup::detect("MCP23017", mcp23017::DEVICE_ID, policy, async || expander.device_id().await).await?;
    expander.configure().await?;

    bringup::detect("LSM6DSO", lsm6dso::DEVICE_ID, policy, async || imu.device_id().await).await?;
    imu.configure().await?;
    imu.hub_pull_up_enable().await?;

    bringup::detect("LPS22HH", lps22hh::DEVICE_ID, policy, async || {
        let hub = SensorHub::new(imu, lps22hh::DEFAULT_ADDRESS);
        Lps22hh::new(hub, timing).device_id().await
    })
    .await?;
    let hub = SensorHub::new(imu, lps22hh::DEFAULT_ADDRESS);
    Lps22hh::new(hub, timing).configure().await?;

    Ok(())
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_nrf::init(Default::default());
    info!("IoT Hub mood tracker starting");

    let mut led = Output::new(p.P0_13, Level::High, OutputDrive::Standard);
    let button_a = Input::new(p.P0_11, Pull::Up);
    let button_b = Input::new(p.P0_12, Pull::Up);

    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    let i2c: Mutex<NoopRawMutex, _> = Mutex::new(i2c);

    let policy = RetryPolicy::default();
    let timing = PollTiming::default();

    let mut expander = Mcp23017::new(SharedI2cBus::new(&i2c, mcp23017::DEFAULT_ADDRESS, "mcp23017"));
    let mut imu = Lsm6dso::new(SharedI2cBus::new(&i2c, lsm6dso::DEFAULT_ADDRESS, "lsm6dso"), timing);

    if let Err(e) = init_peripherals(&mut expander, &mut imu, policy, timing).await {
        error!("peripheral init failed: {:?}", e);
        return;
    }
    info!("peripherals initialized");

    let mut input_state = input::State::<8>::new();
    let (input_runner, input_events) = input::new(&mut input_state, expander, button_a, button_b, INPUT_POLL_INTERVAL);

    let mut sensor_state = sensor::environment::State::<4>::new();
    let (sensor_runner, readings) = sensor::environment::new(&mut sensor_state, imu, timing, SAMPLE_INTERVAL, REPORT_INTERVAL);

    let mut cloud_state = cloud::State::<16>::new();
    let (cloud_runner, telemetry) = cloud::new(&mut cloud_state, DebugUplink, mt_core::config::MOOD_SCOPE_ID);

    let mood_runner = mood_tracker::new(input_events, readings, telemetry);

    let heartbeat = async {
        loop {
            led.set_low();
            Timer::after_millis(100).await;
            led.set_high();
            Timer::after_millis(1900).await;
        }
    };

    join5(input_runner.run(), sensor_runner.run(), mood_runner.run(), cloud_runner.run(), heartbeat).await;
}
