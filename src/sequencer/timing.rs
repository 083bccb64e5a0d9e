//! Conversions between ticks and wall-clock microseconds
//!
//! Tempo is microseconds per quarter note and PPQN is ticks per quarter note,
//! so one tick lasts `tempo / ppqn` microseconds. Intermediate products are
//! widened to `u128` so no realistic input overflows.

/// Duration of `ticks` at a fixed tempo, in microseconds
pub fn ticks_to_micros(ticks: u64, tempo: u32, ppqn: u16) -> u64 {
    if ppqn == 0 {
        return 0;
    }
    let micros = u128::from(ticks) * u128::from(tempo) / u128::from(ppqn);
    u64::try_from(micros).unwrap_or(u64::MAX)
}

/// Number of whole ticks elapsed in `micros` at a fixed tempo
pub fn micros_to_ticks(micros: u64, tempo: u32, ppqn: u16) -> u64 {
    if tempo == 0 {
        return 0;
    }
    let ticks = u128::from(micros) * u128::from(ppqn) / u128::from(tempo);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

/// A (wall clock, tick) pair the play loop measures time from
///
/// Re-anchored whenever the tempo changes so rounding error does not build
/// up over the rest of playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeReference {
    /// Clock reading at the reference point
    pub micros: u64,
    /// Tick at the reference point
    pub tick: u32,
}

impl TimeReference {
    pub fn new(micros: u64, tick: u32) -> Self {
        Self { micros, tick }
    }

    /// Tick reached at clock reading `now`
    pub fn tick_at(&self, now: u64, tempo: u32, ppqn: u16) -> u32 {
        let elapsed = now.saturating_sub(self.micros);
        let ticks = micros_to_ticks(elapsed, tempo, ppqn);
        u32::try_from(u64::from(self.tick) + ticks).unwrap_or(u32::MAX)
    }

    /// Clock reading at which `tick` is reached
    ///
    /// Ticks before the reference map to the reference time itself.
    pub fn micros_at(&self, tick: u32, tempo: u32, ppqn: u16) -> u64 {
        let ticks = u64::from(tick.saturating_sub(self.tick));
        self.micros
            .saturating_add(ticks_to_micros(ticks, tempo, ppqn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_note_at_120_bpm() {
        assert_eq!(ticks_to_micros(480, 500_000, 480), 500_000);
        assert_eq!(micros_to_ticks(500_000, 500_000, 480), 480);
    }

    #[test]
    fn test_rounding_truncates() {
        // 1 tick at 96 PPQN and 60 BPM is 10416.66 us
        assert_eq!(ticks_to_micros(1, 1_000_000, 96), 10_416);
        assert_eq!(micros_to_ticks(10_416, 1_000_000, 96), 0);
        assert_eq!(micros_to_ticks(10_417, 1_000_000, 96), 1);
    }

    #[test]
    fn test_no_overflow() {
        let micros = ticks_to_micros(u64::from(u32::MAX), 0xFF_FFFF, 1);
        assert_eq!(micros, u64::from(u32::MAX) * 0xFF_FFFF);
    }

    #[test]
    fn test_reference_mapping() {
        let reference = TimeReference::new(1_000, 960);
        assert_eq!(reference.micros_at(1_440, 500_000, 480), 1_000 + 500_000);
        assert_eq!(reference.tick_at(1_000 + 250_000, 500_000, 480), 960 + 240);
        // Before the reference
        assert_eq!(reference.micros_at(0, 500_000, 480), 1_000);
        assert_eq!(reference.tick_at(0, 500_000, 480), 960);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(ticks_to_micros(100, 500_000, 0), 0);
        assert_eq!(micros_to_ticks(100, 0, 480), 0);
    }
}
