//! Seeded random streams.
//!
//! Each purpose (`plan`, ...) gets its own ChaCha stream derived from
//! the session seed, so replaying a session with the same seed and inputs
//! selects the same cells.

use std::collections::HashMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct RngManager {
    master: ChaCha8Rng,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: HashMap::new(),
        }
    }

    pub fn stream(&mut self, name: &str) -> SessionRng<'_> {
        let master = &mut self.master;
        let entry = self
            .streams
            .entry(name.to_string())
            .or_insert_with(|| ChaCha8Rng::seed_from_u64(master.next_u64()));
        SessionRng { inner: entry }
    }
}

impl Default for RngManager {
    fn default() -> Self {
        Self::new(7)
    }
}

pub struct SessionRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl RngCore for SessionRng<'_> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
