//! Shared bus, register model and PiFace Digital board management.

use crate::consts::{self, iocon, reg};
use crate::error::{Error, Result};
use crate::gpio::{self, InputPin, Led, OutputPin, RegisterBit, RegisterPort, Relay, Switch};
use crate::interrupt::InterruptSource;
use crate::listener::InputEventListener;
use crate::spi::{BoardAddress, Frame, SpiConfig, SpidevTransport, Transport};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle to the SPI transport shared by every board on one chip select.
///
/// Cloning is cheap; all clones talk through the same transport. A single
/// mutex serialises frames, so a read-modify-write never interleaves with
/// another caller's frame in this process.
#[derive(Clone)]
pub struct Bus {
    transport: Arc<Mutex<Option<Box<dyn Transport>>>>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus").field("open", &self.is_open()).finish()
    }
}

impl Bus {
    /// Wraps an already opened transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Bus {
            transport: Arc::new(Mutex::new(Some(Box::new(transport)))),
        }
    }

    /// Opens `/dev/spidev<bus>.<chip_select>`.
    pub fn open(config: &SpiConfig) -> Result<Self> {
        Ok(Self::new(SpidevTransport::open(config)?))
    }

    /// Drops the transport. Later register access fails with `NotInitialized`.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            debug!("SPI transport closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    // A panicking holder cannot leave a half-written frame behind, so the
    // poisoned state is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exchange(transport: &mut Option<Box<dyn Transport>>, frame: Frame) -> Result<Frame> {
        let transport = transport.as_mut().ok_or(Error::NotInitialized)?;
        Ok(Frame::from_bytes(transport.transfer(frame.to_bytes())?))
    }

    fn read_locked(
        transport: &mut Option<Box<dyn Transport>>,
        addr: u8,
        board: BoardAddress,
    ) -> Result<u8> {
        let response = Self::exchange(transport, Frame::read(board, addr))?;
        trace!(
            "Read board {} reg 0x{:02X} = 0x{:02X}",
            board,
            addr,
            response.data
        );
        Ok(response.data)
    }

    fn write_locked(
        transport: &mut Option<Box<dyn Transport>>,
        addr: u8,
        board: BoardAddress,
        value: u8,
    ) -> Result<()> {
        trace!("Write board {} reg 0x{:02X} = 0x{:02X}", board, addr, value);
        Self::exchange(transport, Frame::write(board, addr, value))?;
        Ok(())
    }

    // --- Register Access ---

    /// Reads a full register.
    pub fn read_register(&self, addr: u8, board: BoardAddress) -> Result<u8> {
        check_register(addr)?;
        Self::read_locked(&mut self.lock(), addr, board)
    }

    /// Writes a full register.
    pub fn write_register(&self, addr: u8, board: BoardAddress, value: u8) -> Result<()> {
        check_register(addr)?;
        Self::write_locked(&mut self.lock(), addr, board, value)
    }

    /// Read-modify-write of a whole register while holding the bus.
    /// Returns the value written.
    pub fn update_register(
        &self,
        addr: u8,
        board: BoardAddress,
        f: impl FnOnce(u8) -> u8,
    ) -> Result<u8> {
        check_register(addr)?;
        let mut transport = self.lock();
        let current = Self::read_locked(&mut transport, addr, board)?;
        let new = f(current);
        Self::write_locked(&mut transport, addr, board, new)?;
        Ok(new)
    }

    /// Reads one raw bit (0 or 1) of a register.
    pub fn read_bit(&self, bit: u8, addr: u8, board: BoardAddress) -> Result<u8> {
        let mask = bit_mask(bit)?;
        Ok((self.read_register(addr, board)? & mask) >> bit)
    }

    /// Sets (`value != 0`) or clears one raw bit, leaving the other seven untouched.
    pub fn write_bit(&self, value: u8, bit: u8, addr: u8, board: BoardAddress) -> Result<()> {
        let mask = bit_mask(bit)?;
        self.update_register(addr, board, |current| {
            if value != 0 {
                current | mask
            } else {
                current & !mask
            }
        })?;
        Ok(())
    }
}

fn check_register(addr: u8) -> Result<()> {
    if addr <= reg::MAX_ADDRESS {
        Ok(())
    } else {
        Err(Error::RegisterOutOfRange { addr })
    }
}

/// `1 << bit` for a bit index 0-7.
pub(crate) fn bit_mask(bit: u8) -> Result<u8> {
    if bit < 8 {
        Ok(1 << bit)
    } else {
        Err(Error::PinOutOfRange { pin: bit, max: 7 })
    }
}

/// Options applied when attaching to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Probe and configure the chip. When false the board is used as found.
    pub init_board: bool,
    /// Clear the output port during init.
    pub output_pins_off: bool,
    /// Number of hardware addresses multi-board init probes (1-4).
    pub board_count: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            init_board: true,
            output_pins_off: true,
            board_count: consts::MAX_BOARDS,
        }
    }
}

/// A single PiFace Digital board.
///
/// Port A drives the eight outputs (the first two also switch the relays),
/// port B reads the eight inputs (the first four are the on-board switches).
/// Inputs are pulled up and active-low; the pin helpers invert them.
#[derive(Debug, Clone)]
pub struct PiFaceDigital {
    bus: Bus,
    address: BoardAddress,
}

impl PiFaceDigital {
    /// Attaches to the board at `address`, initialising it if the config asks to.
    pub fn new(bus: Bus, address: BoardAddress, config: &BoardConfig) -> Result<Self> {
        let board = PiFaceDigital { bus, address };
        if config.init_board {
            board.init_board(config.output_pins_off)?;
        }
        Ok(board)
    }

    pub fn address(&self) -> BoardAddress {
        self.address
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Writes IOCON and reads it back to detect the board, then sets up the ports.
    pub fn init_board(&self, output_pins_off: bool) -> Result<()> {
        let config = iocon::PIFACE_DIGITAL;
        self.bus.write_register(reg::IOCON, self.address, config)?;
        let readback = self.bus.read_register(reg::IOCON, self.address)?;
        if readback != config {
            return Err(Error::DeviceNotDetected {
                board: self.address.number(),
                expected: config,
                actual: readback,
            });
        }
        debug!(
            "PiFace Digital detected at hardware address {}",
            self.address
        );

        if output_pins_off {
            self.bus.write_register(reg::GPIOA, self.address, 0x00)?;
        }
        self.bus.write_register(reg::IODIRA, self.address, 0x00)?; // outputs
        self.bus.write_register(reg::IODIRB, self.address, 0xFF)?; // inputs
        self.bus.write_register(reg::GPPUB, self.address, 0xFF)?; // input pull-ups on
        Ok(())
    }

    /// Disarms the board's input interrupts if they are still armed.
    pub fn deinit_board(&self) -> Result<()> {
        if self.bus.read_register(reg::GPINTENB, self.address)? != 0x00 {
            self.disable_interrupts()?;
        }
        Ok(())
    }

    /// Arms interrupt-on-change for all eight inputs.
    pub fn enable_interrupts(&self) -> Result<()> {
        self.bus.write_register(reg::GPINTENB, self.address, 0xFF)
    }

    pub fn disable_interrupts(&self) -> Result<()> {
        self.bus.write_register(reg::GPINTENB, self.address, 0x00)
    }

    // --- Named pins ---

    pub fn output_pin(&self, index: u8) -> Result<OutputPin> {
        OutputPin::new(self, index)
    }

    pub fn input_pin(&self, index: u8) -> Result<InputPin> {
        InputPin::new(self, index)
    }

    pub fn led(&self, index: u8) -> Result<Led> {
        Led::new(self, index)
    }

    pub fn relay(&self, index: u8) -> Result<Relay> {
        Relay::new(self, index)
    }

    pub fn switch(&self, index: u8) -> Result<Switch> {
        Switch::new(self, index)
    }

    pub fn output_pins(&self) -> Vec<OutputPin> {
        (0..consts::OUTPUT_PIN_COUNT)
            .map(|i| OutputPin::from_bit(self.raw_bit(reg::OUTPUT_PORT, i)))
            .collect()
    }

    pub fn input_pins(&self) -> Vec<InputPin> {
        (0..consts::INPUT_PIN_COUNT)
            .map(|i| InputPin::from_bit(self.raw_bit(reg::INPUT_PORT, i).inverted()))
            .collect()
    }

    pub fn leds(&self) -> Vec<Led> {
        (0..consts::LED_COUNT)
            .map(|i| Led::from_pin(OutputPin::from_bit(self.raw_bit(reg::OUTPUT_PORT, i))))
            .collect()
    }

    pub fn relays(&self) -> Vec<Relay> {
        (0..consts::RELAY_COUNT)
            .map(|i| Relay::from_pin(OutputPin::from_bit(self.raw_bit(reg::OUTPUT_PORT, i))))
            .collect()
    }

    pub fn switches(&self) -> Vec<Switch> {
        (0..consts::SWITCH_COUNT)
            .map(|i| {
                Switch::from_pin(InputPin::from_bit(
                    self.raw_bit(reg::INPUT_PORT, i).inverted(),
                ))
            })
            .collect()
    }

    // --- Ports ---

    /// Output port (GPIOA), raw polarity.
    pub fn output_port(&self) -> RegisterPort {
        RegisterPort::new(self.bus.clone(), self.address, reg::OUTPUT_PORT)
    }

    /// Input port (GPIOB), inverted so a pressed switch reads 1.
    pub fn input_port(&self) -> RegisterPort {
        RegisterPort::new(self.bus.clone(), self.address, reg::INPUT_PORT).inverted()
    }

    /// Input pull-up register (GPPUB).
    pub fn input_pullups(&self) -> RegisterPort {
        RegisterPort::new(self.bus.clone(), self.address, reg::INPUT_PULLUPS)
    }

    pub(crate) fn raw_bit(&self, register: u8, bit: u8) -> RegisterBit {
        RegisterBit::new_unchecked(self.bus.clone(), self.address, register, bit)
    }
}

/// Every PiFace Digital found on one chip select.
///
/// Replaces a process-wide board table: the collection owns the bus and
/// answers the address-based convenience calls.
#[derive(Debug)]
pub struct PiFaceDigitals {
    bus: Bus,
    boards: Vec<PiFaceDigital>,
}

impl PiFaceDigitals {
    /// Opens the SPI device and initialises every board that responds.
    pub fn open(spi: &SpiConfig, config: &BoardConfig) -> Result<Self> {
        Self::init(Bus::open(spi)?, config)
    }

    /// Probes hardware addresses `0..config.board_count` in order.
    ///
    /// A board that fails detection is skipped with a warning; the call only
    /// fails when no board at all responds.
    pub fn init(bus: Bus, config: &BoardConfig) -> Result<Self> {
        if config.board_count == 0 || config.board_count > consts::MAX_BOARDS {
            return Err(Error::BoardOutOfRange {
                board: config.board_count,
            });
        }
        let mut boards = Vec::new();
        for address in BoardAddress::all().take(config.board_count as usize) {
            match PiFaceDigital::new(bus.clone(), address, config) {
                Ok(board) => boards.push(board),
                Err(e @ Error::DeviceNotDetected { .. }) => {
                    warn!("Skipping hardware address {}: {}", address, e);
                }
                Err(e) => return Err(e),
            }
        }
        if boards.is_empty() {
            return Err(Error::NoDeviceDetected {
                attempted: config.board_count,
            });
        }
        debug!(
            "Initialised {} PiFace Digital board(s): {:?}",
            boards.len(),
            boards.iter().map(|b| b.address.number()).collect::<Vec<_>>()
        );
        Ok(PiFaceDigitals { bus, boards })
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Initialised boards in address order.
    pub fn boards(&self) -> &[PiFaceDigital] {
        &self.boards
    }

    pub fn addresses(&self) -> Vec<BoardAddress> {
        self.boards.iter().map(PiFaceDigital::address).collect()
    }

    /// The board at `hardware_addr`, if it was initialised.
    pub fn board(&self, hardware_addr: u8) -> Result<&PiFaceDigital> {
        let address = BoardAddress::new(hardware_addr)?;
        self.boards
            .iter()
            .find(|b| b.address == address)
            .ok_or(Error::NoBoard {
                board: hardware_addr,
            })
    }

    /// Logical value (1 = active) of an input pin.
    pub fn digital_read(&self, pin: u8, hardware_addr: u8) -> Result<u8> {
        self.board(hardware_addr)?.input_pin(pin)?.value()
    }

    pub fn digital_write(&self, pin: u8, value: u8, hardware_addr: u8) -> Result<()> {
        self.board(hardware_addr)?.output_pin(pin)?.set_value(value)
    }

    /// Input pull-up bit for `pin`.
    pub fn digital_read_pullup(&self, pin: u8, hardware_addr: u8) -> Result<u8> {
        let board = self.board(hardware_addr)?;
        gpio::check_index(pin, consts::INPUT_PIN_COUNT)?;
        board.input_pullups().bit(pin)?.value()
    }

    pub fn digital_write_pullup(&self, pin: u8, value: u8, hardware_addr: u8) -> Result<()> {
        let board = self.board(hardware_addr)?;
        gpio::check_index(pin, consts::INPUT_PIN_COUNT)?;
        board.input_pullups().bit(pin)?.set_value(value)
    }

    /// Listener covering every initialised board.
    pub fn listener(&self, source: InterruptSource) -> InputEventListener {
        InputEventListener::new(self.bus.clone(), source, &self.addresses())
    }

    /// Disarms interrupts on every board and closes the transport.
    /// All boards are attempted; the first error is returned.
    pub fn deinit(self) -> Result<()> {
        let mut result = Ok(());
        for board in &self.boards {
            if let Err(e) = board.deinit_board() {
                warn!("Failed to deinit board {}: {}", board.address, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.bus.close();
        result
    }
}
