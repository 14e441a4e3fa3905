//! Internal constants, register addresses, and bit definitions.

use std::time::Duration;

/// Maximum number of boards sharing one chip select (hardware address pins A0/A1).
pub const MAX_BOARDS: u8 = 4;

/// Default SPI bus: `/dev/spidev<bus>.<chip_select>`.
pub const DEFAULT_SPI_BUS: u8 = 0;
/// Default SPI chip select.
pub const DEFAULT_SPI_CHIP_SELECT: u8 = 0;
/// MCP23S17 maximum clock rate.
pub const DEFAULT_SPI_SPEED_HZ: u32 = 10_000_000;

/// Root of the legacy sysfs GPIO interface.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
/// Raspberry Pi GPIO wired to the MCP23S17 INTB line.
pub const DEFAULT_INTERRUPT_GPIO: u32 = 25;
/// Budget for the sysfs export/edge configuration retry loop.
pub const DEFAULT_FILE_IO_TIMEOUT: Duration = Duration::from_secs(1);
/// Sleep between sysfs retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(10);
/// Poll slice used by a background listener so it can notice a stop request.
pub const BACKGROUND_POLL_SLICE: Duration = Duration::from_millis(100);

// --- SPI framing ---
/// Every transaction is exactly three bytes: opcode, register, data.
pub const FRAME_LEN: usize = 3;

pub mod opcode {
    /// Fixed high nibble of the MCP23S17 device opcode (0100 A2 A1 A0 R/W).
    pub const DEVICE: u8 = 0x40;
    /// Hardware address bits, after shifting the board index left by one.
    pub const ADDRESS_MASK: u8 = 0x0E;
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x00;
}

// --- MCP23S17 register map (IOCON.BANK = 0) ---
pub mod reg {
    pub const IODIRA: u8 = 0x00;
    pub const IODIRB: u8 = 0x01;
    pub const IPOLA: u8 = 0x02;
    pub const IPOLB: u8 = 0x03;
    pub const GPINTENA: u8 = 0x04;
    pub const GPINTENB: u8 = 0x05;
    pub const DEFVALA: u8 = 0x06;
    pub const DEFVALB: u8 = 0x07;
    pub const INTCONA: u8 = 0x08;
    pub const INTCONB: u8 = 0x09;
    pub const IOCON: u8 = 0x0A;
    pub const GPPUA: u8 = 0x0C;
    pub const GPPUB: u8 = 0x0D;
    pub const INTFA: u8 = 0x0E;
    pub const INTFB: u8 = 0x0F;
    pub const INTCAPA: u8 = 0x10;
    pub const INTCAPB: u8 = 0x11;
    pub const GPIOA: u8 = 0x12;
    pub const GPIOB: u8 = 0x13;
    pub const OLATA: u8 = 0x14;
    pub const OLATB: u8 = 0x15;

    /// Highest addressable register.
    pub const MAX_ADDRESS: u8 = 0x1F;

    // PiFace Digital wiring
    pub const OUTPUT_PORT: u8 = GPIOA;
    pub const INPUT_PORT: u8 = GPIOB;
    pub const INPUT_PULLUPS: u8 = GPPUB;
}

// --- IOCON bits ---
pub mod iocon {
    pub const BANK_OFF: u8 = 0x00;
    pub const BANK_ON: u8 = 0x80;
    pub const INT_MIRROR_ON: u8 = 0x40;
    pub const INT_MIRROR_OFF: u8 = 0x00;
    pub const SEQOP_OFF: u8 = 0x20;
    pub const SEQOP_ON: u8 = 0x00;
    pub const DISSLW_ON: u8 = 0x10;
    pub const DISSLW_OFF: u8 = 0x00;
    pub const HAEN_ON: u8 = 0x08;
    pub const HAEN_OFF: u8 = 0x00;
    pub const ODR_ON: u8 = 0x04;
    pub const ODR_OFF: u8 = 0x00;
    pub const INTPOL_HIGH: u8 = 0x02;
    pub const INTPOL_LOW: u8 = 0x00;

    /// Configuration written (and read back for detection) by board init.
    pub const PIFACE_DIGITAL: u8 =
        BANK_OFF | INT_MIRROR_OFF | SEQOP_OFF | DISSLW_OFF | HAEN_ON | ODR_OFF | INTPOL_LOW;
}

// --- Board wiring ---
pub const OUTPUT_PIN_COUNT: u8 = 8;
pub const INPUT_PIN_COUNT: u8 = 8;
pub const LED_COUNT: u8 = 8;
pub const RELAY_COUNT: u8 = 2;
pub const SWITCH_COUNT: u8 = 4;
