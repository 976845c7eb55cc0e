pub mod lps22hh;
pub mod lsm6dso;
pub mod mcp23017;

use embassy_time::Duration;

/// Bounded poll of a device completion flag: at most `attempts` reads with
/// `delay` between them. Replaces the unbounded fixed-sleep busy-waits that
/// vendor bring-up code tends to carry.
#[derive(Debug, Clone, Copy)]
pub struct PollTiming {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            attempts: 50,
            delay: Duration::from_millis(20),
        }
    }
}
