//! Fuzzing tests for the file reader and the stream decoder
//!
//! Random and corrupted input must be rejected with an error, never a panic.

use midiseq::{smf, Error, Event, Message, Sequence, StreamDecoder, Track};
use rand::Rng;

fn valid_file() -> Vec<u8> {
    let mut seq = Sequence::new(480);
    let mut track = Track::new();
    track.push(Event::new(Message::tempo(500_000), 0, 0));
    track.push(Event::new(Message::sysex(&[0x41, 0x10, 0x42]), 0, 0));
    for i in 0..16u32 {
        track.push(Event::new(Message::note_on(1, 60 + i as u8, 100), 0, i * 120));
        track.push(Event::new(Message::control_change(1, 1, i as u8), 0, i * 120 + 60));
    }
    track.push(Event::new(Message::end_of_track(), 0, 2000));
    seq.tracks.push(track);
    smf::write(&seq).unwrap()
}

/// Fuzz the reader with random byte sequences
#[test]
fn fuzz_reader_random_bytes() {
    let mut rng = rand::thread_rng();

    for _ in 0..1000 {
        let length = rng.gen_range(0..=256);
        let bytes: Vec<u8> = (0..length).map(|_| rng.gen()).collect();
        // Almost always fails on the marker; must not panic
        let _ = smf::read(&bytes);
    }
}

/// Random bytes behind a valid header and track marker
#[test]
fn fuzz_reader_random_track_bodies() {
    let mut rng = rand::thread_rng();

    for _ in 0..2000 {
        let length = rng.gen_range(0..=64);
        let body: Vec<u8> = (0..length).map(|_| rng.gen()).collect();

        let mut data = Vec::new();
        data.extend_from_slice(b"MThd");
        data.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0x00, 0x60]);
        data.extend_from_slice(b"MTrk");
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(&body);

        match smf::read(&data) {
            Ok(seq) => {
                // Whatever decodes must have consumed the body exactly and be ordered
                let ticks: Vec<u32> = seq.tracks[0].iter().map(|e| e.tick).collect();
                assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
            }
            Err(Error::Format(_)) => {}
            Err(other) => panic!("Expected Format error, got {:?}", other),
        }
    }
}

/// Single-byte corruptions of a valid file
#[test]
fn fuzz_reader_mutations() {
    let mut rng = rand::thread_rng();
    let original = valid_file();

    for _ in 0..2000 {
        let mut data = original.clone();
        let flips = rng.gen_range(1..=4);
        for _ in 0..flips {
            let pos = rng.gen_range(0..data.len());
            data[pos] = rng.gen();
        }
        if rng.gen_bool(0.2) {
            let cut = rng.gen_range(0..data.len());
            data.truncate(cut);
        }

        match smf::read(&data) {
            Ok(seq) => {
                // Re-encoding may refuse a corrupted sysex body, but only as
                // an argument error
                if let Err(e) = smf::write(&seq) {
                    assert!(e.is_argument(), "unexpected {:?}", e);
                }
            }
            Err(Error::Format(_)) => {}
            Err(other) => panic!("Expected Format error, got {:?}", other),
        }
    }
}

/// Random wire bytes in random chunk sizes
#[test]
fn fuzz_stream_decoder() {
    let mut rng = rand::thread_rng();

    for _ in 0..500 {
        let length = rng.gen_range(0..=512);
        let bytes: Vec<u8> = (0..length).map(|_| rng.gen()).collect();

        let mut decoder = StreamDecoder::new();
        let mut out = Vec::new();
        let mut rest = &bytes[..];
        while !rest.is_empty() {
            let n = rng.gen_range(1..=rest.len().min(17));
            decoder.feed(&rest[..n], &mut out);
            rest = &rest[n..];
        }

        for message in &out {
            // Everything the decoder produces is a well-formed wire message
            let wire = message.to_wire().unwrap();
            assert_eq!(Message::from_wire(&wire).unwrap(), *message);
        }
    }
}

/// Chunking must not change what the decoder produces
#[test]
fn fuzz_stream_chunking_is_transparent() {
    let mut rng = rand::thread_rng();
    let status_bytes = [0x80u8, 0x90, 0xB0, 0xC0, 0xE0, 0xF0, 0xF7, 0xF8, 0xF2, 0xF6];

    for _ in 0..500 {
        let mut bytes = Vec::new();
        for _ in 0..rng.gen_range(1..=40) {
            if rng.gen_bool(0.3) {
                bytes.push(status_bytes[rng.gen_range(0..status_bytes.len())] | rng.gen_range(0..=3));
            } else {
                bytes.push(rng.gen_range(0..=127));
            }
        }

        let whole = StreamDecoder::new().decode(&bytes);

        let mut decoder = StreamDecoder::new();
        let mut pieces = Vec::new();
        for byte in &bytes {
            decoder.feed(std::slice::from_ref(byte), &mut pieces);
        }
        assert_eq!(whole, pieces);
    }
}
