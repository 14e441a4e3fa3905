//! Input event listener: waits on the interrupt line and routes each
//! interrupt to at most one registered callback.

use crate::consts::{self, reg};
use crate::device::Bus;
use crate::error::{Error, Result};
use crate::gpio::check_index;
use crate::interrupt::{EdgeFilter, InterruptEvent, InterruptSource, Readiness};
use crate::spi::BoardAddress;
use log::{debug, error, trace, warn};
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked with the decoded event. `Break` ends the wait loop.
pub type Callback = Box<dyn FnMut(&InterruptEvent) -> ControlFlow<()> + Send>;

/// A (board, pin, direction) filter and the callback it triggers.
pub struct Registration {
    pub board: BoardAddress,
    pub pin: u8,
    pub direction: EdgeFilter,
    callback: Callback,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("board", &self.board)
            .field("pin", &self.pin)
            .field("direction", &self.direction)
            .finish()
    }
}

impl Registration {
    pub fn matches(&self, event: &InterruptEvent) -> bool {
        self.board == event.board && self.pin == event.pin && self.direction.matches(event.direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Inactive,
    Active,
}

/// Why a wait loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A callback returned `ControlFlow::Break`.
    Stopped,
    /// No interrupt arrived within the timeout.
    TimedOut,
    /// A signal interrupted the wait, or a background listener was told to stop.
    Cancelled,
}

/// Routes input interrupts from one or more boards to registered callbacks.
///
/// ```no_run
/// use piface_digital::{
///     BoardConfig, EdgeFilter, InterruptConfig, InterruptSource, PiFaceDigitals, SpiConfig,
/// };
/// use std::ops::ControlFlow;
///
/// # fn main() -> piface_digital::Result<()> {
/// let boards = PiFaceDigitals::open(&SpiConfig::default(), &BoardConfig::default())?;
/// let mut listener = boards.listener(InterruptSource::sysfs(&InterruptConfig::default()));
/// listener.register(0, EdgeFilter::ON, 0, |event| {
///     println!("switch {} pressed on board {}", event.pin, event.board);
///     ControlFlow::Break(())
/// })?;
/// listener.wait_for_input(None)?;
/// # Ok(())
/// # }
/// ```
pub struct InputEventListener {
    bus: Bus,
    source: InterruptSource,
    boards: Vec<BoardAddress>,
    registrations: Vec<Registration>,
    state: ListenerState,
}

impl std::fmt::Debug for InputEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputEventListener")
            .field("boards", &self.boards)
            .field("registrations", &self.registrations)
            .field("state", &self.state)
            .finish()
    }
}

impl InputEventListener {
    /// Listener scanning `boards` (in address order) for interrupts.
    pub fn new(bus: Bus, source: InterruptSource, boards: &[BoardAddress]) -> Self {
        let mut boards = boards.to_vec();
        boards.sort_unstable();
        boards.dedup();
        InputEventListener {
            bus,
            source,
            boards,
            registrations: Vec::new(),
            state: ListenerState::Inactive,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn boards(&self) -> &[BoardAddress] {
        &self.boards
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// Adds a registration. Earlier registrations win when several match.
    /// A board not yet scanned is added to the scan list.
    pub fn register<F>(
        &mut self,
        pin: u8,
        direction: EdgeFilter,
        hardware_addr: u8,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&InterruptEvent) -> ControlFlow<()> + Send + 'static,
    {
        let pin = check_index(pin, consts::INPUT_PIN_COUNT)?;
        let board = BoardAddress::new(hardware_addr)?;
        if let Err(pos) = self.boards.binary_search(&board) {
            self.boards.insert(pos, board);
        }
        debug!(
            "Registered board {} pin {} direction {:?}",
            board, pin, direction
        );
        self.registrations.push(Registration {
            board,
            pin,
            direction,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    /// Arms the boards and the interrupt line. No-op when already active.
    pub fn enable(&mut self) -> Result<()> {
        if self.state == ListenerState::Active {
            return Ok(());
        }
        self.source.enable(&self.bus, &self.boards)?;
        self.state = ListenerState::Active;
        Ok(())
    }

    /// Disarms the interrupt line and the boards. No-op when inactive.
    pub fn disable(&mut self) -> Result<()> {
        if self.state == ListenerState::Inactive {
            return Ok(());
        }
        self.state = ListenerState::Inactive;
        self.source.disable(&self.bus, &self.boards)
    }

    /// Blocks, dispatching interrupts, until a callback breaks, a wait times
    /// out (`None` never times out) or a signal interrupts the wait.
    ///
    /// The listener is active for the duration of the call and inactive again
    /// when it returns, on every path.
    pub fn wait_for_input(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        self.run(timeout, None)
    }

    /// Runs the wait loop on a background thread until
    /// [`ActiveListener::deactivate`] or a callback breaks.
    ///
    /// The listener is enabled before this returns, so configuration errors
    /// surface here.
    pub fn activate(mut self) -> Result<ActiveListener> {
        self.enable()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("piface-input-listener".into())
            .spawn(move || {
                let outcome = self.run(None, Some(&*thread_stop));
                (self, outcome)
            })?;
        Ok(ActiveListener {
            stop,
            handle: Some(handle),
        })
    }

    fn run(&mut self, timeout: Option<Duration>, stop: Option<&AtomicBool>) -> Result<WaitOutcome> {
        self.enable()?;
        let outcome = self.wait_loop(timeout, stop);
        let disabled = self.disable();
        let outcome = outcome?;
        disabled?;
        debug!("Input listener finished: {:?}", outcome);
        Ok(outcome)
    }

    fn wait_loop(
        &mut self,
        timeout: Option<Duration>,
        stop: Option<&AtomicBool>,
    ) -> Result<WaitOutcome> {
        // Background listeners wait in short slices so a stop request is seen.
        let slice = stop.map(|_| consts::BACKGROUND_POLL_SLICE);
        loop {
            if stop.is_some_and(|s| s.load(Ordering::Acquire)) {
                return Ok(WaitOutcome::Cancelled);
            }
            match self.source.wait(slice.or(timeout))? {
                Readiness::Ready => {}
                Readiness::TimedOut if slice.is_some() => continue,
                Readiness::TimedOut => return Ok(WaitOutcome::TimedOut),
                Readiness::Interrupted => return Ok(WaitOutcome::Cancelled),
            }
            if self.dispatch()?.is_break() {
                return Ok(WaitOutcome::Stopped);
            }
        }
    }

    /// Finds the board that raised the line and runs the first matching
    /// callback. Boards are scanned in address order and scanning stops at the
    /// first callback; a wake that matches nothing keeps the loop going.
    fn dispatch(&mut self) -> Result<ControlFlow<()>> {
        for &board in &self.boards {
            let flag = self.bus.read_register(reg::INTFB, board)?;
            if flag == 0 {
                continue;
            }
            // Reading the capture register also clears the chip's interrupt.
            let capture = self.bus.read_register(reg::INTCAPB, board)?;
            let Some(event) = InterruptEvent::decode(board, flag, capture) else {
                continue;
            };
            debug!(
                "Interrupt on board {}: flag=0x{:02X} capture=0x{:02X} pin={} {:?}",
                board, flag, capture, event.pin, event.direction
            );
            match self.registrations.iter_mut().find(|r| r.matches(&event)) {
                Some(registration) => return Ok(invoke(registration, &event)),
                None => debug!("No registration for board {} pin {}", board, event.pin),
            }
        }
        trace!("Interrupt wake with no handled event");
        Ok(ControlFlow::Continue(()))
    }
}

// A panicking callback is logged and the loop keeps listening.
fn invoke(registration: &mut Registration, event: &InterruptEvent) -> ControlFlow<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| (registration.callback)(event))) {
        Ok(flow) => flow,
        Err(_) => {
            error!(
                "Callback for board {} pin {} panicked; listener keeps waiting",
                registration.board, registration.pin
            );
            ControlFlow::Continue(())
        }
    }
}

impl Drop for InputEventListener {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            warn!("Failed to disable input listener on drop: {}", e);
        }
    }
}

/// A listener running on its own thread.
#[derive(Debug)]
pub struct ActiveListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<(InputEventListener, Result<WaitOutcome>)>>,
}

impl ActiveListener {
    /// True once the loop has ended on its own (a callback broke out).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the loop, waits for the thread and returns the inactive listener.
    pub fn deactivate(mut self) -> Result<InputEventListener> {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.take().ok_or(Error::ListenerPanicked)?;
        let (listener, outcome) = handle.join().map_err(|_| Error::ListenerPanicked)?;
        outcome?;
        Ok(listener)
    }
}

impl Drop for ActiveListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Release);
            if handle.join().is_err() {
                warn!("Input listener thread panicked");
            }
        }
    }
}
