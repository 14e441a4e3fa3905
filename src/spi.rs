//! SPI transport and MCP23S17 device addressing.

use crate::consts::{self, opcode, FRAME_LEN};
use crate::error::{Error, Result};
use log::{debug, trace};
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::fmt;
use std::path::PathBuf;

/// Byte-oriented full-duplex transport carrying 3-byte MCP23S17 frames.
///
/// Implementations perform one complete request/response exchange per call.
/// Serialisation between callers is the job of [`crate::Bus`].
pub trait Transport: Send {
    /// Clocks `tx` out and returns the three bytes clocked in.
    fn transfer(&mut self, tx: [u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN]>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, tx: [u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN]> {
        (**self).transfer(tx)
    }
}

/// Settings for opening `/dev/spidev<bus>.<chip_select>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    pub bus: u8,
    pub chip_select: u8,
    pub max_speed_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        SpiConfig {
            bus: consts::DEFAULT_SPI_BUS,
            chip_select: consts::DEFAULT_SPI_CHIP_SELECT,
            max_speed_hz: consts::DEFAULT_SPI_SPEED_HZ,
        }
    }
}

impl SpiConfig {
    /// Device node path for this bus/chip select pair.
    pub fn device_path(&self) -> PathBuf {
        PathBuf::from(format!("/dev/spidev{}.{}", self.bus, self.chip_select))
    }
}

/// [`Transport`] over the Linux spidev character device.
pub struct SpidevTransport {
    spi: Spidev,
    path: PathBuf,
}

impl fmt::Debug for SpidevTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpidevTransport")
            .field("path", &self.path)
            .finish()
    }
}

impl SpidevTransport {
    /// Opens and configures the spidev node (mode 0, 8 bits per word).
    pub fn open(config: &SpiConfig) -> Result<Self> {
        let path = config.device_path();
        debug!(
            "Opening SPI device {:?} at {} Hz",
            path, config.max_speed_hz
        );
        let mut spi = Spidev::open(&path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.max_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;
        Ok(SpidevTransport { spi, path })
    }
}

impl Transport for SpidevTransport {
    fn transfer(&mut self, tx: [u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN]> {
        let mut rx = [0u8; FRAME_LEN];
        {
            let mut transfer = SpidevTransfer::read_write(&tx, &mut rx);
            self.spi.transfer(&mut transfer)?;
        }
        trace!("SPI {:02X?} -> {:02X?}", tx, rx);
        Ok(rx)
    }
}

/// Hardware address of a board on the shared chip select (0-3).
/// Use `BoardAddress::new(addr)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoardAddress(u8);

impl BoardAddress {
    /// Creates a board address, returning an error outside 0-3.
    pub fn new(addr: u8) -> Result<Self> {
        if addr < consts::MAX_BOARDS {
            Ok(BoardAddress(addr))
        } else {
            Err(Error::BoardOutOfRange { board: addr })
        }
    }

    /// All addresses in scan order.
    pub fn all() -> impl Iterator<Item = BoardAddress> {
        (0..consts::MAX_BOARDS).map(BoardAddress)
    }

    /// Returns the underlying address (0-3).
    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Opcode byte selecting this board for a read (`0x41 | addr << 1`).
    #[inline]
    pub fn read_opcode(&self) -> u8 {
        self.opcode(opcode::READ)
    }

    /// Opcode byte selecting this board for a write (`0x40 | addr << 1`).
    #[inline]
    pub fn write_opcode(&self) -> u8 {
        self.opcode(opcode::WRITE)
    }

    fn opcode(&self, rw: u8) -> u8 {
        opcode::DEVICE | ((self.0 << 1) & opcode::ADDRESS_MASK) | rw
    }
}

impl fmt::Display for BoardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One 3-byte MCP23S17 SPI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub register: u8,
    pub data: u8,
}

impl Frame {
    /// Read request; the data byte is a dummy.
    pub fn read(board: BoardAddress, register: u8) -> Self {
        Frame {
            opcode: board.read_opcode(),
            register,
            data: 0,
        }
    }

    pub fn write(board: BoardAddress, register: u8, data: u8) -> Self {
        Frame {
            opcode: board.write_opcode(),
            register,
            data,
        }
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; FRAME_LEN] {
        [self.opcode, self.register, self.data]
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Frame {
            opcode: bytes[0],
            register: bytes[1],
            data: bytes[2],
        }
    }

    /// Board address encoded in the opcode.
    #[inline]
    pub fn board(&self) -> u8 {
        (self.opcode & opcode::ADDRESS_MASK) >> 1
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.opcode & opcode::READ != 0
    }
}
