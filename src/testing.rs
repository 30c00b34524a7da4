//! Scripted random source for exact-draw unit tests.

use rand::RngCore;
use std::collections::VecDeque;

/// Replays a fixed sequence of 64-bit words.
///
/// `next_u32` takes the upper half of the next word, so [`index`] words drive
/// `choose`/`random_range` and [`unit`] words drive `random::<f64>()`.
pub struct ScriptedRng {
    words: VecDeque<u64>,
}

impl ScriptedRng {
    pub fn new(words: impl IntoIterator<Item = u64>) -> Self {
        Self {
            words: words.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<u64>::new())
    }

    pub fn is_exhausted(&self) -> bool {
        self.words.is_empty()
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.words.pop_front().expect("scripted rng exhausted")
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Word that makes `random::<f64>()` return `x` (up to 53-bit precision).
pub fn unit(x: f64) -> u64 {
    ((x * (1u64 << 53) as f64) as u64) << 11
}

/// Word that makes a uniform pick over `n` elements return `i`.
pub fn index(i: usize, n: usize) -> u64 {
    let x = ((i as u64) << 32).div_ceil(n as u64);
    x << 32
}
