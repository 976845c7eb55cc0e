use embassy_sync::{
    blocking_mutex::raw::NoopRawMutex,
    channel::{Channel, Receiver, Sender},
};
use embassy_time::{Duration, Ticker};
use embedded_hal::digital::InputPin;

use crate::bus::RegisterBus;
use crate::driver::mcp23017::{DEFAULT_INDICATORS, Mcp23017};

/// Input channels wired to the expander's port A, bits 0-3.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    Happy,
    Meh,
    Mad,
    Proximity,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [ChannelId::Happy, ChannelId::Meh, ChannelId::Mad, ChannelId::Proximity];

    pub fn label(self) -> &'static str {
        match self {
            ChannelId::Happy => "HappyButton",
            ChannelId::Meh => "MehButton",
            ChannelId::Mad => "MadButton",
            ChannelId::Proximity => "ProximityAlert",
        }
    }

    pub fn vote(self) -> u8 {
        match self {
            ChannelId::Happy => 3,
            ChannelId::Meh => 2,
            ChannelId::Mad => 1,
            ChannelId::Proximity => 0,
        }
    }

    fn bit(self) -> u8 {
        match self {
            ChannelId::Happy => 0x01,
            ChannelId::Meh => 0x02,
            ChannelId::Mad => 0x04,
            ChannelId::Proximity => 0x08,
        }
    }

    /// Polarity on the expander port: bit clear = pressed (pulled up, the
    /// switch shorts to ground).
    pub fn is_pressed_in(self, levels: u8) -> bool {
        levels & self.bit() == 0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEvent {
    /// An expander channel changed level.
    Expander { channel: ChannelId, pressed: bool },
    /// The send-message button was pressed (press edge only).
    ButtonA,
    /// The orientation button was pressed (press edge only).
    ButtonB,
}

/// State-diff over the packed expander byte. An event fires only on a level
/// transition against the committed snapshot, never while a level is held.
/// No debounce filtering beyond that; a single electrical bounce produces a
/// spurious pair of events, which is a known limitation of the fast poll.
pub struct Scanner {
    previous: u8,
}

impl Scanner {
    pub fn new() -> Self {
        // Idle is all-released: pull-ups keep every bit high.
        Scanner { previous: 0xFF }
    }

    /// Diff `levels` against the previous snapshot and commit it.
    pub fn diff(&mut self, levels: u8) -> heapless::Vec<InputEvent, 4> {
        let mut events = heapless::Vec::new();
        for channel in ChannelId::ALL {
            let was = channel.is_pressed_in(self.previous);
            let now = channel.is_pressed_in(levels);
            if was != now {
                let _ = events.push(InputEvent::Expander { channel, pressed: now });
            }
        }
        self.previous = levels;
        events
    }

    /// Indicator byte for the expander's output port: button backlights on
    /// while idle, dark while held down.
    pub fn indicators(&self) -> u8 {
        let pressed = !self.previous & 0x07;
        DEFAULT_INDICATORS & !pressed
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Press-edge detector for a directly wired button, polarity pressed = low.
/// Only the press transition reports; releases are ignored.
pub struct ButtonEdge {
    was_pressed: bool,
}

impl ButtonEdge {
    pub fn new() -> Self {
        ButtonEdge { was_pressed: false }
    }

    pub fn update(&mut self, pressed: bool) -> bool {
        let fired = pressed && !self.was_pressed;
        self.was_pressed = pressed;
        fired
    }
}

impl Default for ButtonEdge {
    fn default() -> Self {
        Self::new()
    }
}

pub struct State<const N: usize> {
    channel: Channel<NoopRawMutex, InputEvent, N>,
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

pub struct Runner<'a, B: RegisterBus, BtnA: InputPin, BtnB: InputPin, const N: usize> {
    expander: Mcp23017<B>,
    button_a: BtnA,
    button_b: BtnB,
    edge_a: ButtonEdge,
    edge_b: ButtonEdge,
    scanner: Scanner,
    poll_interval: Duration,
    events: Sender<'a, NoopRawMutex, InputEvent, N>,
}

pub fn new<'a, B: RegisterBus, BtnA: InputPin, BtnB: InputPin, const N: usize>(
    state: &'a mut State<N>,
    expander: Mcp23017<B>,
    button_a: BtnA,
    button_b: BtnB,
    poll_interval: Duration,
) -> (Runner<'a, B, BtnA, BtnB, N>, Receiver<'a, NoopRawMutex, InputEvent, N>) {
    (
        Runner {
            expander,
            button_a,
            button_b,
            edge_a: ButtonEdge::new(),
            edge_b: ButtonEdge::new(),
            scanner: Scanner::new(),
            poll_interval,
            events: state.channel.sender(),
        },
        state.channel.receiver(),
    )
}

impl<B: RegisterBus, BtnA: InputPin, BtnB: InputPin, const N: usize> Runner<'_, B, BtnA, BtnB, N> {
    pub async fn run(mut self) {
        let mut ticker = Ticker::every(self.poll_interval);
        loop {
            ticker.next().await;
            self.poll_once().await;
        }
    }

    /// One fast poll cycle: expander byte, then the direct buttons. A
    /// transient read failure skips the cycle instead of tearing anything
    /// down; the next tick retries.
    pub async fn poll_once(&mut self) {
        match self.expander.read_inputs().await {
            Ok(levels) => {
                let events = self.scanner.diff(levels);
                if !events.is_empty()
                    && let Err(e) = self.expander.write_outputs(self.scanner.indicators()).await
                {
                    warn!("Input> indicator update failed: {:?}", e);
                }
                for event in events {
                    debug!("Input> {:?}", event);
                    self.events.send(event).await;
                }
            }
            Err(e) => {
                warn!("Input> expander read failed: {:?}, skipping cycle", e);
            }
        }

        match self.button_a.is_low() {
            Ok(pressed) => {
                if self.edge_a.update(pressed) {
                    debug!("Input> button A pressed");
                    self.events.send(InputEvent::ButtonA).await;
                }
            }
            Err(_) => warn!("Input> button A read failed"),
        }
        match self.button_b.is_low() {
            Ok(pressed) => {
                if self.edge_b.update(pressed) {
                    debug!("Input> button B pressed");
                    self.events.send(InputEvent::ButtonB).await;
                }
            }
            Err(_) => warn!("Input> button B read failed"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use core::convert::Infallible;

    use crate::bus::BusError;

    use super::*;

    #[test]
    fn packed_byte_decode_bit_clear_is_pressed() {
        // Bit 0 is channel 0; bits 1 and 3 are low, so those channels read
        // as pressed.
        let levels = 0b1111_0101;
        assert!(!ChannelId::Happy.is_pressed_in(levels));
        assert!(ChannelId::Meh.is_pressed_in(levels));
        assert!(!ChannelId::Mad.is_pressed_in(levels));
        assert!(ChannelId::Proximity.is_pressed_in(levels));
    }

    #[test]
    fn event_fires_only_on_transition() {
        let mut scanner = Scanner::new();

        // Two identical reads: exactly one event on the transition, none on
        // the repeat.
        let events = scanner.diff(0b1111_1110);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            InputEvent::Expander {
                channel: ChannelId::Happy,
                pressed: true
            }
        );
        assert!(scanner.diff(0b1111_1110).is_empty());

        // Release is a transition too.
        let events = scanner.diff(0b1111_1111);
        assert_eq!(
            events[0],
            InputEvent::Expander {
                channel: ChannelId::Happy,
                pressed: false
            }
        );
    }

    #[test]
    fn simultaneous_transitions_all_report() {
        let mut scanner = Scanner::new();
        let events = scanner.diff(0b1111_0101);
        assert_eq!(events.len(), 2);
        assert!(events.contains(&InputEvent::Expander {
            channel: ChannelId::Meh,
            pressed: true
        }));
        assert!(events.contains(&InputEvent::Expander {
            channel: ChannelId::Proximity,
            pressed: true
        }));
    }

    #[test]
    fn indicators_go_dark_while_held() {
        let mut scanner = Scanner::new();
        assert_eq!(scanner.indicators(), DEFAULT_INDICATORS);
        scanner.diff(0b1111_1110);
        assert_eq!(scanner.indicators(), DEFAULT_INDICATORS & !0x01);
        scanner.diff(0b1111_1111);
        assert_eq!(scanner.indicators(), DEFAULT_INDICATORS);
    }

    #[test]
    fn button_edge_reports_press_only_once() {
        let mut edge = ButtonEdge::new();
        assert!(!edge.update(false));
        assert!(edge.update(true));
        assert!(!edge.update(true));
        assert!(!edge.update(false));
        assert!(edge.update(true));
    }

    struct FakeExpanderBus {
        inputs: std::rc::Rc<core::cell::Cell<u8>>,
        fail_reads: bool,
    }

    impl RegisterBus for FakeExpanderBus {
        async fn read(&mut self, _reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
            if self.fail_reads {
                return Err(BusError::TransientIo);
            }
            buf[0] = self.inputs.get();
            Ok(())
        }

        async fn write(&mut self, _reg: u8, _data: &[u8]) -> Result<(), BusError> {
            Ok(())
        }
    }

    struct FakePin {
        low: bool,
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.low)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(self.low)
        }
    }

    #[tokio::test]
    async fn poll_cycle_emits_events_into_the_channel() {
        let inputs = std::rc::Rc::new(core::cell::Cell::new(0xFFu8));
        let mut state = State::<8>::new();
        let bus = FakeExpanderBus {
            inputs: inputs.clone(),
            fail_reads: false,
        };
        let (mut runner, receiver) = new(
            &mut state,
            Mcp23017::new(bus),
            FakePin { low: false },
            FakePin { low: true },
            Duration::from_millis(10),
        );

        runner.poll_once().await;
        assert_eq!(receiver.try_receive(), Ok(InputEvent::ButtonB));
        assert!(receiver.try_receive().is_err());

        inputs.set(0b1111_1011);
        runner.poll_once().await;
        assert_eq!(
            receiver.try_receive(),
            Ok(InputEvent::Expander {
                channel: ChannelId::Mad,
                pressed: true
            })
        );
        assert!(receiver.try_receive().is_err());
    }

    #[tokio::test]
    async fn transient_read_failure_skips_the_cycle() {
        let mut state = State::<8>::new();
        let bus = FakeExpanderBus {
            inputs: std::rc::Rc::new(core::cell::Cell::new(0x00)),
            fail_reads: true,
        };
        let (mut runner, receiver) = new(
            &mut state,
            Mcp23017::new(bus),
            FakePin { low: false },
            FakePin { low: false },
            Duration::from_millis(10),
        );

        runner.poll_once().await;
        assert!(receiver.try_receive().is_err());
    }
}
