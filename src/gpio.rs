use crate::consts;
use crate::device::{bit_mask, Bus, PiFaceDigital};
use crate::error::{Error, Result};
use crate::spi::BoardAddress;

/// Validates `index` against an item count, e.g. `check_index(i, SWITCH_COUNT)`.
pub(crate) fn check_index(index: u8, count: u8) -> Result<u8> {
    if index < count {
        Ok(index)
    } else {
        Err(Error::PinOutOfRange {
            pin: index,
            max: count - 1,
        })
    }
}

/// One bit of one register on one board.
///
/// With `inverted` set the bit is presented active-low: chip level 0 reads
/// as 1. The inversion lives here, above the polarity-agnostic [`Bus`].
#[derive(Debug, Clone)]
pub struct RegisterBit {
    bus: Bus,
    board: BoardAddress,
    register: u8,
    bit: u8,
    inverted: bool,
}

impl RegisterBit {
    /// Creates a bit handle, returning an error if `bit` is not 0-7.
    pub fn new(bus: Bus, board: BoardAddress, register: u8, bit: u8) -> Result<Self> {
        bit_mask(bit)?;
        Ok(Self::new_unchecked(bus, board, register, bit))
    }

    pub(crate) fn new_unchecked(bus: Bus, board: BoardAddress, register: u8, bit: u8) -> Self {
        RegisterBit {
            bus,
            board,
            register,
            bit,
            inverted: false,
        }
    }

    /// Same bit, presented active-low.
    pub fn inverted(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    #[inline]
    pub fn bit(&self) -> u8 {
        self.bit
    }

    #[inline]
    pub fn register(&self) -> u8 {
        self.register
    }

    #[inline]
    pub fn board(&self) -> BoardAddress {
        self.board
    }

    #[inline]
    fn polarity(&self) -> u8 {
        u8::from(self.inverted)
    }

    /// Logical value (0 or 1).
    pub fn value(&self) -> Result<u8> {
        Ok(self.bus.read_bit(self.bit, self.register, self.board)? ^ self.polarity())
    }

    /// Writes a logical value (non-zero = 1).
    pub fn set_value(&self, value: u8) -> Result<()> {
        let logical = u8::from(value != 0);
        self.bus
            .write_bit(logical ^ self.polarity(), self.bit, self.register, self.board)
    }

    /// Flips the bit in a single locked read-modify-write.
    pub fn toggle(&self) -> Result<()> {
        let mask = 1 << self.bit;
        self.bus
            .update_register(self.register, self.board, |current| current ^ mask)?;
        Ok(())
    }
}

/// A whole 8-bit port register on one board.
#[derive(Debug, Clone)]
pub struct RegisterPort {
    bus: Bus,
    board: BoardAddress,
    register: u8,
    inverted: bool,
}

impl RegisterPort {
    pub fn new(bus: Bus, board: BoardAddress, register: u8) -> Self {
        RegisterPort {
            bus,
            board,
            register,
            inverted: false,
        }
    }

    /// Same port, presented active-low.
    pub fn inverted(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    #[inline]
    fn polarity(&self) -> u8 {
        if self.inverted {
            0xFF
        } else {
            0x00
        }
    }

    pub fn value(&self) -> Result<u8> {
        Ok(self.bus.read_register(self.register, self.board)? ^ self.polarity())
    }

    pub fn set_value(&self, value: u8) -> Result<()> {
        self.bus
            .write_register(self.register, self.board, value ^ self.polarity())
    }

    pub fn all_on(&self) -> Result<()> {
        self.set_value(0xFF)
    }

    pub fn all_off(&self) -> Result<()> {
        self.set_value(0x00)
    }

    /// Inverts every bit of the port.
    pub fn toggle(&self) -> Result<()> {
        self.bus
            .update_register(self.register, self.board, |current| !current)?;
        Ok(())
    }

    /// Handle on one bit, sharing this port's polarity.
    pub fn bit(&self, bit: u8) -> Result<RegisterBit> {
        let bit = RegisterBit::new(self.bus.clone(), self.board, self.register, bit)?;
        Ok(if self.inverted { bit.inverted() } else { bit })
    }
}

/// An output pin (port A bit).
#[derive(Debug, Clone)]
pub struct OutputPin(RegisterBit);

impl OutputPin {
    /// Output pin 0-7 of `board`.
    pub fn new(board: &PiFaceDigital, index: u8) -> Result<Self> {
        let index = check_index(index, consts::OUTPUT_PIN_COUNT)?;
        Ok(OutputPin(board.raw_bit(consts::reg::OUTPUT_PORT, index)))
    }

    pub(crate) fn from_bit(bit: RegisterBit) -> Self {
        OutputPin(bit)
    }

    #[inline]
    pub fn number(&self) -> u8 {
        self.0.bit()
    }

    /// Current state of the output latch.
    pub fn value(&self) -> Result<u8> {
        self.0.value()
    }

    pub fn set_value(&self, value: u8) -> Result<()> {
        self.0.set_value(value)
    }

    pub fn turn_on(&self) -> Result<()> {
        self.set_value(1)
    }

    pub fn turn_off(&self) -> Result<()> {
        self.set_value(0)
    }

    pub fn toggle(&self) -> Result<()> {
        self.0.toggle()
    }
}

/// An input pin (port B bit), active-low. Reads 1 when the input is pulled to ground.
/// There is deliberately no way to write one.
#[derive(Debug, Clone)]
pub struct InputPin(RegisterBit);

impl InputPin {
    /// Input pin 0-7 of `board`.
    pub fn new(board: &PiFaceDigital, index: u8) -> Result<Self> {
        let index = check_index(index, consts::INPUT_PIN_COUNT)?;
        Ok(InputPin(
            board.raw_bit(consts::reg::INPUT_PORT, index).inverted(),
        ))
    }

    pub(crate) fn from_bit(bit: RegisterBit) -> Self {
        InputPin(bit)
    }

    #[inline]
    pub fn number(&self) -> u8 {
        self.0.bit()
    }

    pub fn value(&self) -> Result<u8> {
        self.0.value()
    }
}

/// One of the eight LEDs (mirrors output pins 0-7).
#[derive(Debug, Clone)]
pub struct Led(OutputPin);

/// One of the two relays (switched by output pins 0-1).
#[derive(Debug, Clone)]
pub struct Relay(OutputPin);

/// One of the four push switches (input pins 0-3).
#[derive(Debug, Clone)]
pub struct Switch(InputPin);

macro_rules! output_item {
    ($name:ident, $count:expr) => {
        impl $name {
            pub fn new(board: &PiFaceDigital, index: u8) -> Result<Self> {
                let index = check_index(index, $count)?;
                Ok($name(OutputPin::from_bit(
                    board.raw_bit(consts::reg::OUTPUT_PORT, index),
                )))
            }

            pub(crate) fn from_pin(pin: OutputPin) -> Self {
                $name(pin)
            }

            pub fn pin(&self) -> &OutputPin {
                &self.0
            }

            pub fn value(&self) -> Result<u8> {
                self.0.value()
            }

            pub fn set_value(&self, value: u8) -> Result<()> {
                self.0.set_value(value)
            }

            pub fn turn_on(&self) -> Result<()> {
                self.0.turn_on()
            }

            pub fn turn_off(&self) -> Result<()> {
                self.0.turn_off()
            }

            pub fn toggle(&self) -> Result<()> {
                self.0.toggle()
            }
        }
    };
}

output_item!(Led, consts::LED_COUNT);
output_item!(Relay, consts::RELAY_COUNT);

impl Switch {
    pub fn new(board: &PiFaceDigital, index: u8) -> Result<Self> {
        let index = check_index(index, consts::SWITCH_COUNT)?;
        Ok(Switch(InputPin::from_bit(
            board.raw_bit(consts::reg::INPUT_PORT, index).inverted(),
        )))
    }

    pub(crate) fn from_pin(pin: InputPin) -> Self {
        Switch(pin)
    }

    pub fn pin(&self) -> &InputPin {
        &self.0
    }

    /// 1 while the switch is pressed.
    pub fn value(&self) -> Result<u8> {
        self.0.value()
    }
}
