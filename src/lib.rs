//! # piface-digital
//!
//! A Rust crate for driving PiFace Digital I/O boards (MCP23S17 port
//! expanders on the Raspberry Pi SPI bus) and reacting to input changes
//! through the shared GPIO interrupt line instead of polling.
//!
//! This crate uses the `spidev` crate for the SPI character device and
//! `nix` to wait on the sysfs GPIO value file.
//!
//! ## Features
//!
//! *   SPI transport (`SpidevTransport`) behind a `Transport` trait, 3-byte MCP23S17 frames.
//! *   Up to four daisy-chained boards on one chip select (`BoardAddress` 0-3).
//! *   Register model (`Bus`):
//!     *   Full register reads/writes (`read_register`, `write_register`).
//!     *   Single-bit access (`read_bit`, `write_bit`) as locked read-modify-write.
//!     *   All frames serialised through one mutex, shareable across threads.
//! *   Board management:
//!     *   Detection and setup (`PiFaceDigital::new`, `init_board`).
//!     *   Multi-board init tolerant of missing boards (`PiFaceDigitals::init`).
//!     *   `digital_read` / `digital_write` / pull-up helpers by board address.
//! *   Named pins: `Led` (0-7), `Relay` (0-1), `Switch` (0-3), `OutputPin`, `InputPin`,
//!     and whole ports. Inputs are active-low and read as 1 when pressed.
//! *   Input events:
//!     *   Interrupt line lifecycle with bounded retries (`InterruptSource`).
//!     *   Registrations per (board, pin, `EdgeFilter`) with a closure callback.
//!     *   Blocking `wait_for_input` or a background thread (`activate` / `deactivate`).
//!
//! ## Hardware Setup Notes
//!
//! *   Enable SPI (`dtparam=spi=on`); boards appear on `/dev/spidev0.0`.
//! *   Board hardware addresses are set with the JP1/JP2 jumpers.
//! *   Every board's INTB output drives Raspberry Pi GPIO 25, which is
//!     exported through `/sys/class/gpio` while a listener is active.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use piface_digital::{BoardConfig, PiFaceDigitals, Result, SpiConfig};
//! use std::{thread, time::Duration};
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let boards = PiFaceDigitals::open(&SpiConfig::default(), &BoardConfig::default())?;
//!     let board = boards.board(0)?;
//!
//!     board.led(3)?.turn_on()?;
//!     thread::sleep(Duration::from_millis(200));
//!     board.led(3)?.turn_off()?;
//!
//!     println!("switch 0: {}", boards.digital_read(0, 0)?);
//!     boards.deinit()
//! }
//! ```
//!
//! ## License
//!
//! This project is licensed under the GPL-3.0-or-later.

mod consts;
pub mod device;
mod error;
pub mod gpio;
pub mod interrupt;
pub mod listener;
pub mod spi;

pub use device::{BoardConfig, Bus, PiFaceDigital, PiFaceDigitals};
pub use error::{Error, Result};
pub use gpio::{InputPin, Led, OutputPin, RegisterBit, RegisterPort, Relay, Switch};
pub use interrupt::{
    Clock, Edge, EdgeFilter, InterruptConfig, InterruptEvent, InterruptLine, InterruptSource,
    Readiness, SysfsInterruptLine, SystemClock, TriggerEdge,
};
pub use listener::{ActiveListener, InputEventListener, ListenerState, WaitOutcome};
pub use spi::{BoardAddress, Frame, SpiConfig, SpidevTransport, Transport};
// Re-export only essential public constants
pub use consts::{
    FRAME_LEN, INPUT_PIN_COUNT, LED_COUNT, MAX_BOARDS, OUTPUT_PIN_COUNT, RELAY_COUNT,
    SWITCH_COUNT,
};

/// MCP23S17 register addresses (IOCON.BANK = 0) and configuration bits.
pub mod registers {
    pub use crate::consts::iocon;
    pub use crate::consts::reg::*;
}
