//! Element-wise perturbation of 0/1 vectors.

use crate::error::{Error, Result};
use rand::Rng;

/// Flip a bit: 0 becomes 1 and 1 becomes 0.
pub fn flip(bit: u8) -> Result<u8> {
    match bit {
        0 => Ok(1),
        1 => Ok(0),
        _ => Err(Error::InvalidBit(bit)),
    }
}

/// Return a copy of `bits` where each element is flipped with probability `prob`.
///
/// One uniform draw is taken per element when `0 < prob < 1`; the boundary
/// probabilities draw nothing. A mutation that leaves the vector unchanged is
/// reported as a warning.
pub fn mutate<R: Rng + ?Sized>(bits: &[u8], prob: f64, rng: &mut R) -> Result<Vec<u8>> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(Error::InvalidProbability(prob));
    }
    if let Some(&bit) = bits.iter().find(|&&bit| bit > 1) {
        return Err(Error::InvalidBit(bit));
    }

    let mutated: Vec<u8> = if prob == 0.0 {
        bits.to_vec()
    } else if prob == 1.0 {
        bits.iter().map(|&bit| flip(bit)).collect::<Result<_>>()?
    } else {
        bits.iter()
            .map(|&bit| {
                if rng.random::<f64>() < prob {
                    flip(bit)
                } else {
                    Ok(bit)
                }
            })
            .collect::<Result<_>>()?
    };

    if prob > 0.0 && mutated == bits {
        log::warn!("mutation with probability {prob} left {bits:?} unchanged");
    }
    Ok(mutated)
}

/// Generate `n` independently mutated copies of `prototype`.
pub fn training_examples<R: Rng + ?Sized>(
    prototype: &[u8],
    n: usize,
    prob: f64,
    rng: &mut R,
) -> Result<Vec<Vec<u8>>> {
    (0..n).map(|_| mutate(prototype, prob, rng)).collect()
}
