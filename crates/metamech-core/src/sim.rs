//! Simulation clock, per-tick results, and the determinism hash.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, SimTime};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Simulated time and tick counter. Only [`Engine::tick`] advances it, and
/// `time` never decreases.
///
/// [`Engine::tick`]: crate::engine::Engine::tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    pub time: SimTime,
    pub ticks: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `elapsed` simulated seconds. Negative input is ignored.
    pub fn advance(&mut self, elapsed: Fixed64) {
        self.time = self.time.saturating_add(elapsed.max(Fixed64::ZERO));
        self.ticks += 1;
    }
}

// ---------------------------------------------------------------------------
// Tick result
// ---------------------------------------------------------------------------

/// What happened during one [`Engine::tick`] call.
///
/// [`Engine::tick`]: crate::engine::Engine::tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickResult {
    /// Simulated seconds added to the clock (`dt * speed` after clamping).
    pub elapsed: Fixed64,
    pub spawned: u32,
    /// Products that reached the end of an edge.
    pub arrived: u32,
    pub completed: u32,
    pub dropped: u32,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// FNV-1a (64-bit) hash of simulation state, for determinism checks. Not
/// cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
