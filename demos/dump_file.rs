//! Dump the contents of a Standard MIDI File
//!
//! This example demonstrates:
//! - Reading an SMF from disk
//! - Inspecting header fields (format, timing)
//! - Walking tracks and events
//! - Finding tempo and signature changes
//!
//! Usage: `cargo run --example dump_file -- song.mid`

use midiseq::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: dump_file <file.mid>");
        return Ok(());
    };

    println!("Reading {}...", path);
    let sequence = midiseq::smf::read_file(&path)?;

    println!("Format: {}", sequence.format.as_u16());
    match sequence.timing {
        Timing::Ppqn(ppqn) => println!("Timing: {} ticks per quarter note", ppqn),
        Timing::Smpte(_) => println!(
            "Timing: SMPTE {} fps, {} ticks per frame",
            sequence.timing.smpte_frames_per_second().unwrap_or(0),
            sequence.timing.smpte_ticks_per_frame().unwrap_or(0)
        ),
    }
    println!(
        "Tracks: {} ({} events, {} ticks)",
        sequence.tracks.len(),
        sequence.event_count(),
        sequence.duration()
    );
    println!();

    // Tempo map
    let mut from = 0;
    while let Some(event) = sequence.next_tempo(from) {
        if let Some(tempo) = event.message.as_tempo() {
            println!(
                "Tempo at tick {}: {} us/quarter ({:.1} BPM)",
                event.tick,
                tempo,
                60_000_000.0 / f64::from(tempo.max(1))
            );
        }
        from = event.tick + 1;
    }
    if let Some(event) = sequence.next_time_signature(0) {
        println!("First time signature: {}", event);
    }
    println!();

    print!("{}", sequence);
    Ok(())
}
