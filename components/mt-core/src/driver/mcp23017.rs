use crate::bus::{BusError, RegisterBus};

pub const DEFAULT_ADDRESS: u8 = 0x20;

/// Power-on-reset value of IODIRA. The part has no who-am-i register, so the
/// reset default of the first register doubles as the identity byte.
pub const DEVICE_ID: u8 = 0xFF;

/// Indicator byte driven onto port B right after configuration.
pub const DEFAULT_INDICATORS: u8 = 0x07;

const IODIRA: u8 = 0x00;
const IODIRB: u8 = 0x01;
const GPPUA: u8 = 0x0C;
const GPIOA: u8 = 0x12;
const GPIOB: u8 = 0x13;

/// MCP23017 GPIO expander. Port A reads the buttons and the proximity
/// signal, port B drives the indicator transistors.
pub struct Mcp23017<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> Mcp23017<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub async fn device_id(&mut self) -> Result<u8, BusError> {
        self.bus.read_byte(IODIRA).await
    }

    /// One-time startup configuration. Every write result is checked; a
    /// half-configured expander is not usable for polling.
    pub async fn configure(&mut self) -> Result<(), BusError> {
        self.bus.write_byte(IODIRB, 0x00).await?;
        self.bus.write_byte(GPIOB, DEFAULT_INDICATORS).await?;
        self.bus.write_byte(IODIRA, 0xFF).await?;
        self.bus.write_byte(GPPUA, 0xFF).await?;
        Ok(())
    }

    /// All port A levels packed as bits, one read per poll cycle.
    pub async fn read_inputs(&mut self) -> Result<u8, BusError> {
        self.bus.read_byte(GPIOA).await
    }

    pub async fn write_outputs(&mut self, levels: u8) -> Result<(), BusError> {
        self.bus.write_byte(GPIOB, levels).await
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeBus {
        regs: [u8; 0x16],
        writes: Vec<(u8, u8)>,
        fail_on: Option<u8>,
    }

    impl RegisterBus for FakeBus {
        async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = self.regs[reg as usize + i];
            }
            Ok(())
        }

        async fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
            if self.fail_on == Some(reg) {
                return Err(BusError::TransientIo);
            }
            for (i, byte) in data.iter().enumerate() {
                self.regs[reg as usize + i] = *byte;
                self.writes.push((reg + i as u8, *byte));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn device_id_is_por_default() {
        let mut bus = FakeBus::default();
        bus.regs[IODIRA as usize] = 0xFF;
        let mut expander = Mcp23017::new(bus);
        assert_eq!(expander.device_id().await.unwrap(), DEVICE_ID);
    }

    #[tokio::test]
    async fn configure_writes_directions_pullups_and_defaults() {
        let mut expander = Mcp23017::new(FakeBus::default());
        expander.configure().await.unwrap();
        assert_eq!(
            expander.bus.writes,
            vec![(IODIRB, 0x00), (GPIOB, DEFAULT_INDICATORS), (IODIRA, 0xFF), (GPPUA, 0xFF)]
        );
    }

    #[tokio::test]
    async fn configure_surfaces_write_failures() {
        let bus = FakeBus {
            fail_on: Some(GPPUA),
            ..Default::default()
        };
        let mut expander = Mcp23017::new(bus);
        assert_eq!(expander.configure().await, Err(BusError::TransientIo));
    }

    #[tokio::test]
    async fn inputs_and_outputs_use_their_ports() {
        let mut bus = FakeBus::default();
        bus.regs[GPIOA as usize] = 0b1111_1010;
        let mut expander = Mcp23017::new(bus);

        assert_eq!(expander.read_inputs().await.unwrap(), 0b1111_1010);
        expander.write_outputs(0x05).await.unwrap();
        assert_eq!(expander.bus.regs[GPIOB as usize], 0x05);
    }
}
