//! Test doubles: an in-memory MCP23S17 chain, a scripted interrupt line and
//! a manually advanced clock.

#![allow(dead_code)]

use piface_digital::registers::{GPINTENB, GPIOB, INTCAPB, INTFB};
use piface_digital::{
    Bus, Clock, Frame, InterruptLine, Readiness, Result, TriggerEdge, Transport, FRAME_LEN,
};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ChipState {
    pub registers: [[u8; 0x20]; 4],
    pub present: [bool; 4],
    pub frames: Vec<[u8; FRAME_LEN]>,
}

/// Up to four MCP23S17s sharing one chip select. Absent boards never drive
/// MISO, so reads from them return 0.
#[derive(Debug, Clone)]
pub struct SimulatedChips(Arc<Mutex<ChipState>>);

impl SimulatedChips {
    pub fn new(present: &[u8]) -> Self {
        let mut flags = [false; 4];
        for &board in present {
            flags[board as usize] = true;
        }
        let mut registers = [[0u8; 0x20]; 4];
        for regs in registers.iter_mut() {
            // Inputs idle high (pull-ups, nothing pressed).
            regs[GPIOB as usize] = 0xFF;
        }
        SimulatedChips(Arc::new(Mutex::new(ChipState {
            registers,
            present: flags,
            frames: Vec::new(),
        })))
    }

    pub fn bus(&self) -> Bus {
        Bus::new(self.clone())
    }

    pub fn register(&self, board: u8, addr: u8) -> u8 {
        self.0.lock().unwrap().registers[board as usize][addr as usize]
    }

    pub fn set_register(&self, board: u8, addr: u8, value: u8) {
        self.0.lock().unwrap().registers[board as usize][addr as usize] = value;
    }

    /// Latches an input change the way the chip does.
    pub fn raise_interrupt(&self, board: u8, flag: u8, capture: u8) {
        let mut state = self.0.lock().unwrap();
        let regs = &mut state.registers[board as usize];
        regs[INTFB as usize] = flag;
        regs[INTCAPB as usize] = capture;
        regs[GPIOB as usize] = capture;
    }

    pub fn frames(&self) -> Vec<[u8; FRAME_LEN]> {
        self.0.lock().unwrap().frames.clone()
    }

    pub fn clear_frames(&self) {
        self.0.lock().unwrap().frames.clear();
    }
}

impl Transport for SimulatedChips {
    fn transfer(&mut self, tx: [u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN]> {
        let mut state = self.0.lock().unwrap();
        state.frames.push(tx);
        let frame = Frame::from_bytes(tx);
        let board = frame.board() as usize;
        let addr = frame.register as usize;
        if !state.present[board] {
            return Ok([0, 0, 0]);
        }
        let regs = &mut state.registers[board];
        if frame.is_read() {
            let data = regs[addr];
            if frame.register == INTCAPB {
                regs[INTFB as usize] = 0;
            }
            Ok([0, 0, data])
        } else {
            regs[addr] = frame.data;
            Ok([0, 0, 0])
        }
    }
}

/// A transport whose every exchange fails.
pub struct BrokenTransport;

impl Transport for BrokenTransport {
    fn transfer(&mut self, _tx: [u8; FRAME_LEN]) -> Result<[u8; FRAME_LEN]> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "SPI device gone").into())
    }
}

/// What the next `wait` on a [`ScriptedLine`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Interrupt { board: u8, flag: u8, capture: u8 },
    /// Line fired but no chip latched anything.
    Spurious,
    Timeout,
    Signal,
}

#[derive(Debug, Default)]
pub struct LineState {
    pub exported: bool,
    /// Export requests that complete at all.
    pub export_completes: bool,
    /// Number of existence checks after an export that still report absent.
    pub export_lag: usize,
    pub export_requested: bool,
    /// Number of upcoming `set_edge` calls that fail with EACCES.
    pub edge_failures: usize,
    pub edge: Option<TriggerEdge>,
    pub wakes: VecDeque<Wake>,
    /// Edges latched by the armed line and not yet consumed by a wait.
    pub pending_edges: usize,
    pub wait_timeouts: Vec<Option<Duration>>,
    /// Ordered record of lifecycle calls.
    pub log: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScriptedLine {
    pub state: Arc<Mutex<LineState>>,
    chips: SimulatedChips,
}

impl ScriptedLine {
    pub fn new(chips: &SimulatedChips) -> Self {
        ScriptedLine {
            state: Arc::new(Mutex::new(LineState {
                export_completes: true,
                ..LineState::default()
            })),
            chips: chips.clone(),
        }
    }

    pub fn push(&self, wake: Wake) -> &Self {
        self.state.lock().unwrap().wakes.push_back(wake);
        self
    }

    /// Latches an input change on a chip and, if the line is armed for
    /// falling edges, records an edge the next `wait` reports.
    pub fn raise_edge(&self, board: u8, flag: u8, capture: u8) {
        self.chips.raise_interrupt(board, flag, capture);
        let mut state = self.state.lock().unwrap();
        if state.edge == Some(TriggerEdge::Falling) {
            state.pending_edges += 1;
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn edge(&self) -> Option<TriggerEdge> {
        self.state.lock().unwrap().edge
    }

    pub fn is_exported_now(&self) -> bool {
        self.state.lock().unwrap().exported
    }
}

impl InterruptLine for ScriptedLine {
    fn is_exported(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.exported && state.export_requested && state.export_completes {
            if state.export_lag > 0 {
                state.export_lag -= 1;
            } else {
                state.exported = true;
            }
        }
        state.exported
    }

    fn export(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push("export".into());
        state.export_requested = true;
        if state.export_completes && state.export_lag == 0 {
            state.exported = true;
        }
        Ok(())
    }

    fn unexport(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push("unexport".into());
        state.exported = false;
        state.export_requested = false;
        state.edge = None;
        state.pending_edges = 0;
        Ok(())
    }

    fn set_edge(&mut self, edge: TriggerEdge) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.edge_failures > 0 {
            state.edge_failures -= 1;
            state.log.push("edge-denied".into());
            return Err(io::Error::from(io::ErrorKind::PermissionDenied).into());
        }
        state.log.push(format!("edge:{}", edge.as_str()));
        state.edge = Some(edge);
        if edge == TriggerEdge::None {
            state.pending_edges = 0;
        }
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Readiness> {
        let wake = {
            let mut state = self.state.lock().unwrap();
            state.wait_timeouts.push(timeout);
            if state.pending_edges > 0 {
                state.pending_edges -= 1;
                return Ok(Readiness::Ready);
            }
            state.wakes.pop_front()
        };
        match wake {
            Some(Wake::Interrupt {
                board,
                flag,
                capture,
            }) => {
                self.chips.raise_interrupt(board, flag, capture);
                Ok(Readiness::Ready)
            }
            Some(Wake::Spurious) => Ok(Readiness::Ready),
            Some(Wake::Timeout) => Ok(Readiness::TimedOut),
            Some(Wake::Signal) => Ok(Readiness::Interrupted),
            None => {
                // Keep background loops from spinning hot.
                std::thread::sleep(Duration::from_millis(1));
                Ok(Readiness::TimedOut)
            }
        }
    }
}

/// Clock that only moves when slept on.
#[derive(Debug, Clone)]
pub struct FakeClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

pub fn gpintenb(chips: &SimulatedChips, board: u8) -> u8 {
    chips.register(board, GPINTENB)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
