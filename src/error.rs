use thiserror::Error;

/// Errors that can occur when driving PiFace Digital boards.
///
/// This enum covers transport failures, board detection, argument range
/// checks and the interrupt line lifecycle.
#[derive(Error, Debug)]
pub enum Error {
    /// The transport was used before it was opened, or after it was closed.
    #[error("SPI transport is not initialised (open the bus before use, or it was closed by deinit)")]
    NotInitialized,
    /// A board did not echo back its IOCON configuration.
    #[error(
        "No PiFace Digital board detected at hardware address {board}: wrote IOCON 0x{expected:02X}, read back 0x{actual:02X}"
    )]
    DeviceNotDetected {
        /// The hardware address that was probed.
        board: u8,
        /// The configuration byte written.
        expected: u8,
        /// The byte read back.
        actual: u8,
    },
    /// Multi-board init found no board at any address.
    #[error("No PiFace Digital board detected at any of {attempted} hardware addresses")]
    NoDeviceDetected {
        /// Number of addresses probed.
        attempted: u8,
    },
    /// A convenience call addressed a board that was not initialised.
    #[error("There is no initialised PiFace Digital with hardware address {board}")]
    NoBoard {
        /// The requested hardware address.
        board: u8,
    },
    /// Pin or bit index is outside the valid range for the addressed item.
    #[error("Pin {pin} out of range (0-{max})")]
    PinOutOfRange {
        /// The invalid index.
        pin: u8,
        /// Largest valid index.
        max: u8,
    },
    /// Board hardware address is outside 0-3.
    #[error("Board address {board} out of range (0-3)")]
    BoardOutOfRange {
        /// The invalid address.
        board: u8,
    },
    /// Register address is outside the chip's register file.
    #[error("Register address 0x{addr:02X} out of range (0x00-0x1F)")]
    RegisterOutOfRange {
        /// The invalid register address.
        addr: u8,
    },
    /// A bounded retry loop ran out of time.
    #[error("Timeout waiting for {operation}")]
    Timeout {
        /// What was being waited for.
        operation: String,
    },
    /// General I/O error from the SPI device or sysfs files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// System call failure (poll).
    #[error("System call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
    /// The background listener thread panicked outside a callback.
    #[error("Background input listener thread panicked")]
    ListenerPanicked,
}

impl Error {
    /// True for pin, board and register index errors. These are programming
    /// errors and are never worth retrying.
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            Error::PinOutOfRange { .. }
                | Error::BoardOutOfRange { .. }
                | Error::RegisterOutOfRange { .. }
        )
    }
}

/// Result type alias for PiFace Digital operations.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn timeout(operation: impl Into<String>) -> Error {
    Error::Timeout {
        operation: operation.into(),
    }
}
