//! Play a Standard MIDI File through a printing output
//!
//! This example demonstrates:
//! - Building a sequencer from a parsed file
//! - Implementing OutputSink
//! - Applying tick-0 state with a seek before playing
//! - Pausing and resuming
//!
//! Usage: `cargo run --example play_file -- song.mid`

use std::time::{Duration, Instant};

use midiseq::prelude::*;

/// Prints every message with the time since playback started
struct ConsoleOutput {
    start: Instant,
}

impl OutputSink for ConsoleOutput {
    fn send(&mut self, message: &Message) -> Result<()> {
        let wire = message.to_wire()?;
        println!(
            "{:>8.3}s  {:<50} {:02X?}",
            self.start.elapsed().as_secs_f64(),
            message.to_string(),
            wire.as_slice()
        );
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        println!("-- all notes off --");
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: play_file <file.mid>");
        return Ok(());
    };

    let sequence = midiseq::smf::read_file(&path)?;
    println!("Loaded {} ({} events)", path, sequence.event_count());

    let output = ConsoleOutput {
        start: Instant::now(),
    };
    let sequencer = Sequencer::from_sequence(&sequence, SinkListener::new(output))?;

    // Tempo, patches and controllers at tick 0
    sequencer.position_to_time(0)?;

    println!("Playing 3 seconds...");
    sequencer.play()?;
    std::thread::sleep(Duration::from_secs(3));
    sequencer.pause()?;
    println!("Paused at tick {}", sequencer.position());

    std::thread::sleep(Duration::from_secs(1));

    println!("Resuming...");
    sequencer.play()?;
    while sequencer.state() == SequencerState::Playing {
        std::thread::sleep(Duration::from_millis(50));
    }

    println!("Done ({:?})", sequencer.state());
    Ok(())
}
