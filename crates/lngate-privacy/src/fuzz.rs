//! Bounded-noise field transformers and their randomness source.
//!
//! Unlike the map-backed pseudonyms these values are freshly sampled on
//! every call: amounts and timestamps are drawn uniformly from an
//! interval centered on the real value, booleans from a fair coin.
//! The resulting distributions have mean equal to the input and
//! variance `w²/12` for an interval of width `w`, which the tests
//! verify statistically.
//!
//! The random-int function is injectable so rewrites can be made
//! deterministic in tests; production uses the OS random source.

use std::sync::Arc;

use lngate_types::{GateError, Result};
use rand::rngs::OsRng;
use rand::Rng;

// ---------------------------------------------------------------------------
// Randomness source
// ---------------------------------------------------------------------------

/// A function returning a uniform integer in `[0, n)`.
pub type RandIntn = Arc<dyn Fn(u64) -> Result<u64> + Send + Sync>;

/// Returns the production randomness source, drawing from the OS
/// CSPRNG.
pub fn crypto_rand_intn() -> RandIntn {
    Arc::new(|n| {
        if n == 0 {
            return Ok(0);
        }
        Ok(OsRng.gen_range(0..n))
    })
}

/// Returns a uniform integer in `[min, max)` using the given source.
pub fn rand_between(rand: &RandIntn, min: u64, max: u64) -> Result<u64> {
    if max < min {
        return Err(GateError::Config {
            reason: format!("invalid random interval [{min}, {max})"),
        });
    }
    Ok(min + rand(max - min)?)
}

// ---------------------------------------------------------------------------
// Fuzzed fields
// ---------------------------------------------------------------------------

/// Returns a uniform amount within ±`relative_variation` of `amount`.
///
/// With `v = ⌊amount · relative_variation⌋` the result lies in
/// `[amount − v, amount + v]`. Zero passes through, and so do amounts
/// small enough that the interval collapses (`v = 0`).
pub fn hide_amount(rand: &RandIntn, relative_variation: f64, amount: u64) -> Result<u64> {
    if amount == 0 {
        return Ok(0);
    }

    let variation = (amount as f64 * relative_variation) as u64;
    if variation == 0 {
        return Ok(amount);
    }

    let fuzz = rand_between(rand, 0, 2 * variation + 1)?;
    Ok(amount - variation + fuzz)
}

/// Returns a uniform timestamp within ±`absolute_variation_ns` of
/// `timestamp_ns` (both in nanoseconds since the Unix epoch).
///
/// The zero timestamp passes through, as does a timestamp smaller than
/// the variation window (the interval would reach before the epoch).
pub fn hide_timestamp(
    rand: &RandIntn,
    absolute_variation_ns: u64,
    timestamp_ns: u64,
) -> Result<u64> {
    if timestamp_ns == 0 {
        return Ok(0);
    }

    let Some(lower) = timestamp_ns.checked_sub(absolute_variation_ns) else {
        return Ok(timestamp_ns);
    };

    let fuzz = rand_between(rand, 0, 2 * absolute_variation_ns + 1)?;
    Ok(lower + fuzz)
}

/// Returns a fair coin flip.
pub fn hide_bool(rand: &RandIntn) -> Result<bool> {
    Ok(rand(2)? != 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
