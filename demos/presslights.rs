use piface_digital::{
    BoardConfig, EdgeFilter, InterruptConfig, InterruptSource, PiFaceDigitals, Result, SpiConfig,
    SWITCH_COUNT,
};
use std::io::{self, BufRead};
use std::ops::ControlFlow;

// Lights output pin N while switch N is held down.
fn main() -> Result<()> {
    env_logger::init();
    let boards = PiFaceDigitals::open(&SpiConfig::default(), &BoardConfig::default())?;
    let board = boards.board(0)?.clone();

    let mut listener = boards.listener(InterruptSource::sysfs(&InterruptConfig::default()));
    for i in 0..SWITCH_COUNT {
        let pressed = board.output_pin(i)?;
        listener.register(i, EdgeFilter::ON, 0, move |_| {
            if let Err(e) = pressed.turn_on() {
                eprintln!("Failed to turn on output {}: {}", i, e);
            }
            ControlFlow::Continue(())
        })?;
        let released = board.output_pin(i)?;
        listener.register(i, EdgeFilter::OFF, 0, move |_| {
            if let Err(e) = released.turn_off() {
                eprintln!("Failed to turn off output {}: {}", i, e);
            }
            ControlFlow::Continue(())
        })?;
    }

    let active = listener.activate()?;
    println!("Press switches 0-3 on board 0. Press Enter to quit.");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    active.deactivate()?;
    boards.deinit()
}
