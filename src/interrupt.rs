//! Input interrupt decoding and the shared interrupt line lifecycle.
//!
//! Every board's INTB output is wired to one Raspberry Pi GPIO. The chip
//! drives it low on a change, so the line is armed for falling edges only
//! and the listener works out which board raised it by reading INTFB.

use crate::consts::{self, reg};
use crate::device::Bus;
use crate::error::{self, Error, Result};
use crate::spi::BoardAddress;
use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Transition seen on an input pin, at chip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// The pin became 0: an active-low input was switched on.
    Falling,
    /// The pin became 1: the input was released.
    Rising,
}

impl Edge {
    fn from_level(level: u8) -> Self {
        if level == 0 {
            Edge::Falling
        } else {
            Edge::Rising
        }
    }
}

/// Which transitions a registration wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeFilter {
    Falling,
    Rising,
    Both,
}

impl EdgeFilter {
    /// Input switched on (pressed).
    pub const ON: EdgeFilter = EdgeFilter::Falling;
    /// Input switched off (released).
    pub const OFF: EdgeFilter = EdgeFilter::Rising;

    pub fn matches(self, edge: Edge) -> bool {
        match self {
            EdgeFilter::Both => true,
            EdgeFilter::Falling => edge == Edge::Falling,
            EdgeFilter::Rising => edge == Edge::Rising,
        }
    }
}

/// One decoded interrupt from one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent {
    pub board: BoardAddress,
    /// INTFB: which input(s) caused the interrupt.
    pub interrupt_flag: u8,
    /// INTCAPB: port B as captured when the interrupt fired.
    pub interrupt_capture: u8,
    /// Lowest flagged pin.
    pub pin: u8,
    pub direction: Edge,
}

impl InterruptEvent {
    /// Decodes a flag/capture pair. Returns `None` when no flag bit is set.
    ///
    /// If several flags are set the lowest pin wins.
    pub fn decode(board: BoardAddress, interrupt_flag: u8, interrupt_capture: u8) -> Option<Self> {
        if interrupt_flag == 0 {
            return None;
        }
        let pin = interrupt_flag.trailing_zeros() as u8;
        let flag_bit = 1u8 << pin;
        let level = (flag_bit & interrupt_capture) >> pin;
        Some(InterruptEvent {
            board,
            interrupt_flag,
            interrupt_capture,
            pin,
            direction: Edge::from_level(level),
        })
    }
}

/// Values accepted by the sysfs `edge` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEdge {
    None,
    Rising,
    Falling,
    Both,
}

impl TriggerEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEdge::None => "none",
            TriggerEdge::Rising => "rising",
            TriggerEdge::Falling => "falling",
            TriggerEdge::Both => "both",
        }
    }
}

/// Result of one blocking wait on the interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The line changed.
    Ready,
    TimedOut,
    /// The wait was cut short by a signal delivered to the process.
    Interrupted,
}

/// The shared edge-notification line.
pub trait InterruptLine: Send {
    /// True once the line is visible to userspace.
    fn is_exported(&self) -> bool;
    /// Requests the line be made visible. Completion may lag behind the call.
    fn export(&mut self) -> Result<()>;
    fn unexport(&mut self) -> Result<()>;
    fn set_edge(&mut self, edge: TriggerEdge) -> Result<()>;
    /// Blocks until the line is asserted, the timeout passes (`None` waits
    /// forever) or a signal arrives.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<Readiness>;
}

/// Time source for the export/edge retry loops.
pub trait Clock: Send {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Location and timing of the sysfs interrupt GPIO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptConfig {
    pub gpio_root: PathBuf,
    pub pin: u32,
    /// Budget for export and edge configuration.
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        InterruptConfig {
            gpio_root: PathBuf::from(consts::DEFAULT_GPIO_ROOT),
            pin: consts::DEFAULT_INTERRUPT_GPIO,
            timeout: consts::DEFAULT_FILE_IO_TIMEOUT,
            retry_interval: consts::DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// [`InterruptLine`] on the legacy `/sys/class/gpio` interface.
///
/// The `value` file is opened once when an edge is armed and held until the
/// edge is set back to none or the line is unexported. kernfs tracks edges per
/// open descriptor, so an edge that fires between two waits is still reported
/// by the next one. Attribute files are opened per write and closed again.
#[derive(Debug)]
pub struct SysfsInterruptLine {
    root: PathBuf,
    pin: u32,
    value: Option<File>,
}

impl SysfsInterruptLine {
    pub fn new(root: impl Into<PathBuf>, pin: u32) -> Self {
        SysfsInterruptLine {
            root: root.into(),
            pin,
            value: None,
        }
    }

    pub fn from_config(config: &InterruptConfig) -> Self {
        Self::new(config.gpio_root.clone(), config.pin)
    }

    /// `<root>/gpio<pin>`
    pub fn gpio_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn write_attribute(path: &Path, value: &str) -> Result<()> {
        trace!("Writing {:?} to {:?}", value, path);
        let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
        file.write_all(value.as_bytes())?;
        Ok(())
    }
}

impl InterruptLine for SysfsInterruptLine {
    fn is_exported(&self) -> bool {
        self.gpio_dir().is_dir()
    }

    fn export(&mut self) -> Result<()> {
        Self::write_attribute(&self.root.join("export"), &self.pin.to_string())
    }

    fn unexport(&mut self) -> Result<()> {
        self.value = None;
        Self::write_attribute(&self.root.join("unexport"), &self.pin.to_string())
    }

    fn set_edge(&mut self, edge: TriggerEdge) -> Result<()> {
        Self::write_attribute(&self.gpio_dir().join("edge"), edge.as_str())?;
        if edge == TriggerEdge::None {
            self.value = None;
        } else if self.value.is_none() {
            self.value = Some(self.open_value()?);
        }
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Readiness> {
        let pin = self.pin;
        let value = match self.value {
            Some(ref mut value) => value,
            None => {
                let file = self.open_value()?;
                self.value.insert(file)
            }
        };

        let timeout = match timeout {
            None => PollTimeout::NONE,
            Some(duration) => {
                let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
                PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX)
            }
        };
        let ready = {
            let mut fds = [PollFd::new(
                value.as_fd(),
                PollFlags::POLLPRI | PollFlags::POLLERR,
            )];
            match poll(&mut fds, timeout) {
                Ok(0) => Readiness::TimedOut,
                Ok(_) => Readiness::Ready,
                Err(Errno::EINTR) => Readiness::Interrupted,
                Err(e) => return Err(e.into()),
            }
        };
        // Only a read acknowledges the edge; an edge arriving later stays pending.
        if ready == Readiness::Ready {
            clear_value(value)?;
        }
        trace!("GPIO{} wait -> {:?}", pin, ready);
        Ok(ready)
    }
}

impl SysfsInterruptLine {
    // Opening and reading once syncs the descriptor with the current state.
    fn open_value(&self) -> Result<File> {
        let mut file = File::open(self.gpio_dir().join("value"))?;
        clear_value(&mut file)?;
        trace!("GPIO{} value file opened", self.pin);
        Ok(file)
    }

    /// True while the `value` descriptor is held open.
    pub fn is_armed(&self) -> bool {
        self.value.is_some()
    }
}

fn clear_value(file: &mut File) -> Result<()> {
    let mut buf = [0u8; 8];
    file.seek(SeekFrom::Start(0))?;
    let _ = file.read(&mut buf)?;
    Ok(())
}

/// Brings the interrupt line and the boards' interrupt-enable registers up
/// and down together.
pub struct InterruptSource {
    line: Box<dyn InterruptLine>,
    clock: Box<dyn Clock>,
    timeout: Duration,
    retry_interval: Duration,
}

impl std::fmt::Debug for InterruptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSource")
            .field("timeout", &self.timeout)
            .field("retry_interval", &self.retry_interval)
            .finish()
    }
}

impl InterruptSource {
    pub fn new(line: impl InterruptLine + 'static) -> Self {
        InterruptSource {
            line: Box::new(line),
            clock: Box::new(SystemClock),
            timeout: consts::DEFAULT_FILE_IO_TIMEOUT,
            retry_interval: consts::DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Sysfs line configured from `config`.
    pub fn sysfs(config: &InterruptConfig) -> Self {
        Self::new(SysfsInterruptLine::from_config(config))
            .with_timeout(config.timeout)
            .with_retry_interval(config.retry_interval)
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Arms GPINTENB on every board, then exports the line and sets it to
    /// falling-edge, both within one `timeout` budget. On failure the boards
    /// are disarmed again and a line exported by this call is unexported.
    pub fn enable(&mut self, bus: &Bus, boards: &[BoardAddress]) -> Result<()> {
        debug!("Enabling input interrupts on boards {:?}", boards);
        for &board in boards {
            bus.write_register(reg::GPINTENB, board, 0xFF)?;
        }
        let deadline = self.clock.now() + self.timeout;
        let exporting = !self.line.is_exported();
        let result = self
            .bring_into_userspace(deadline)
            .and_then(|()| self.set_edge_with_retry(TriggerEdge::Falling, deadline));
        if let Err(e) = result {
            if exporting {
                if let Err(rollback) = self.line.unexport() {
                    warn!("Failed to unexport interrupt line after enable failure: {}", rollback);
                }
            }
            for &board in boards {
                if let Err(rollback) = bus.write_register(reg::GPINTENB, board, 0x00) {
                    warn!("Failed to disarm board {} after enable failure: {}", board, rollback);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Sets the edge to none, unexports the line, then disarms every board.
    /// All steps are attempted; the first error is returned.
    pub fn disable(&mut self, bus: &Bus, boards: &[BoardAddress]) -> Result<()> {
        debug!("Disabling input interrupts on boards {:?}", boards);
        let mut first_error = None;
        let mut note = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                warn!("Interrupt disable step '{}' failed: {}", step, e);
                first_error.get_or_insert(e);
            }
        };
        note("edge none", self.line.set_edge(TriggerEdge::None));
        note("unexport", self.line.unexport());
        for &board in boards {
            note("disarm", bus.write_register(reg::GPINTENB, board, 0x00));
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Blocks on the line.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Readiness> {
        self.line.wait(timeout)
    }

    fn bring_into_userspace(&mut self, deadline: Instant) -> Result<()> {
        if self.line.is_exported() {
            return Ok(());
        }
        self.line.export()?;
        while !self.line.is_exported() {
            if self.clock.now() >= deadline {
                return Err(error::timeout("interrupt GPIO export"));
            }
            self.clock.sleep(self.retry_interval);
        }
        Ok(())
    }

    // The attribute usually exists before udev has fixed its permissions,
    // so I/O errors are retried until the deadline.
    fn set_edge_with_retry(&mut self, edge: TriggerEdge, deadline: Instant) -> Result<()> {
        loop {
            match self.line.set_edge(edge) {
                Ok(()) => return Ok(()),
                Err(Error::Io(e)) => {
                    if self.clock.now() >= deadline {
                        debug!("Giving up on edge configuration: {}", e);
                        return Err(error::timeout(format!(
                            "interrupt edge '{}'",
                            edge.as_str()
                        )));
                    }
                    trace!("Edge configuration not ready yet: {}", e);
                    self.clock.sleep(self.retry_interval);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
