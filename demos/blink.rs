use piface_digital::{BoardConfig, PiFaceDigitals, Result, SpiConfig};
use std::{thread, time::Duration};

// LED 7 sits away from the relays, so the blink is silent
const BLINK_LED: u8 = 7;

fn main() -> Result<()> {
    env_logger::init();
    println!("Opening PiFace Digital boards on /dev/spidev0.0...");
    let boards = PiFaceDigitals::open(&SpiConfig::default(), &BoardConfig::default())?;
    println!("Boards found at hardware addresses {:?}", boards.addresses());

    let board = &boards.boards()[0];
    let led = board.led(BLINK_LED)?;

    println!(
        "Blinking LED {} on board {} (Press Ctrl+C to stop)",
        BLINK_LED,
        board.address()
    );
    loop {
        led.turn_on()?;
        thread::sleep(Duration::from_millis(250));
        led.turn_off()?;
        thread::sleep(Duration::from_millis(250));
    }
    // Note: Loop runs forever, outputs stay as they are on Ctrl+C
}
