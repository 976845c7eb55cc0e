use embassy_sync::{
    blocking_mutex::raw::NoopRawMutex,
    channel::{Channel, Receiver, Sender},
};
use embassy_time::{Duration, Instant, Ticker};

use crate::bus::{BusError, RegisterBus};
use crate::driver::PollTiming;
use crate::driver::lps22hh::{self, Lps22hh};
use crate::driver::lsm6dso::{Lsm6dso, SensorHub};

#[derive(Default, Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub accel_mg: [f32; 3],
    pub pressure_hpa: f32,
}

#[derive(Default, Debug)]
pub struct Averaging {
    sum: Reading,
    count: u32,
}

impl Averaging {
    pub fn add_reading(&mut self, reading: &Reading) {
        self.sum.accel_mg[0] += reading.accel_mg[0];
        self.sum.accel_mg[1] += reading.accel_mg[1];
        self.sum.accel_mg[2] += reading.accel_mg[2];
        self.sum.pressure_hpa += reading.pressure_hpa;
        self.count += 1;
    }

    pub fn average(&mut self) -> Option<(Reading, u32)> {
        if self.count == 0 {
            None
        } else {
            let count = self.count;
            let reading = Some((
                Reading {
                    accel_mg: [
                        self.sum.accel_mg[0] / count as f32,
                        self.sum.accel_mg[1] / count as f32,
                        self.sum.accel_mg[2] / count as f32,
                    ],
                    pressure_hpa: self.sum.pressure_hpa / count as f32,
                },
                count,
            ));
            self.sum = Reading::default();
            self.count = 0;
            reading
        }
    }
}

pub struct State<const N: usize> {
    channel: Channel<NoopRawMutex, Reading, N>,
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

pub fn new<'a, B: RegisterBus, const N: usize>(
    state: &'a mut State<N>,
    imu: Lsm6dso<B>,
    baro_timing: PollTiming,
    sample_interval: Duration,
    report_interval: Duration,
) -> (Runner<'a, B, N>, Receiver<'a, NoopRawMutex, Reading, N>) {
    (
        Runner {
            imu,
            baro_timing,
            averaging: Averaging::default(),
            sample_interval,
            report_interval,
            readings: state.channel.sender(),
        },
        state.channel.receiver(),
    )
}

/// Samples the IMU directly and the barometer through the sensor-hub
/// passthrough, averages over the report interval and hands the average on.
pub struct Runner<'a, B: RegisterBus, const N: usize> {
    imu: Lsm6dso<B>,
    baro_timing: PollTiming,
    averaging: Averaging,
    sample_interval: Duration,
    report_interval: Duration,
    readings: Sender<'a, NoopRawMutex, Reading, N>,
}

impl<B: RegisterBus, const N: usize> Runner<'_, B, N> {
    pub async fn run(mut self) {
        loop {
            self.report_once().await;
        }
    }

    pub async fn report_once(&mut self) {
        let end = Instant::now() + self.report_interval;
        let mut ticker = Ticker::every(self.sample_interval);
        loop {
            ticker.next().await;
            match self.sample().await {
                Ok(reading) => self.averaging.add_reading(&reading),
                Err(e) => warn!("Env> sample failed: {:?}", e),
            }
            if Instant::now() >= end {
                if let Some((average, count)) = self.averaging.average() {
                    debug!("Env.Average> Over {} => {:?}", count, average);
                    self.readings.send(average).await;
                } else {
                    warn!("Env.Average> No samples collected during interval {}s", self.report_interval.as_secs());
                }
                break;
            }
        }
    }

    async fn sample(&mut self) -> Result<Reading, BusError> {
        let accel_mg = self.imu.read_accel_mg().await?;
        let hub = SensorHub::new(&mut self.imu, lps22hh::DEFAULT_ADDRESS);
        let mut baro = Lps22hh::new(hub, self.baro_timing);
        let pressure_hpa = baro.read_pressure_hpa().await?;
        Ok(Reading { accel_mg, pressure_hpa })
    }
}

#[cfg(test)]
pub mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn averaging() {
        let mut storage = Averaging::default();
        assert!(storage.average().is_none());

        storage.add_reading(&Reading {
            accel_mg: [0.0, 0.0, 1000.0],
            pressure_hpa: 1010.0,
        });
        storage.add_reading(&Reading {
            accel_mg: [10.0, -10.0, 980.0],
            pressure_hpa: 1014.0,
        });

        let (average, count) = storage.average().unwrap();
        assert_eq!(count, 2);
        assert_relative_eq!(average.accel_mg[0], 5.0);
        assert_relative_eq!(average.accel_mg[1], -5.0);
        assert_relative_eq!(average.accel_mg[2], 990.0);
        assert_relative_eq!(average.pressure_hpa, 1012.0);

        assert!(storage.average().is_none());
    }
}
