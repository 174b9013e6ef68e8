//! Modulo-8 sequence arithmetic.
//!
//! All comparisons use the "modulo-8 within window <= 7" convention; the
//! stateful machine calls these pure functions so the boundary cases can be
//! tested in isolation.

use paxterm_core::constants::SEQ_MODULUS;

/// Advance a sequence number.
pub fn increment(seq: u8) -> u8 {
    (seq + 1) % SEQ_MODULUS
}

/// Modular distance from `from` up to `to`.
pub fn distance(from: u8, to: u8) -> u8 {
    to.wrapping_sub(from) % SEQ_MODULUS
}

/// How many frames are in flight given V(S) and V(A).
pub fn outstanding(vs: u8, va: u8) -> u8 {
    distance(va, vs)
}

/// Whether an acknowledgement carrying N(R) covers the frame numbered N(S).
///
/// N(R) acknowledges everything before it: N(S) is covered iff
/// `(N(R) - 1 - N(S)) mod 8 < window`.
pub fn acknowledges(nr: u8, ns: u8, window: u8) -> bool {
    nr.wrapping_sub(1).wrapping_sub(ns) % SEQ_MODULUS < window
}

/// Whether a received N(R) is plausible: it must lie between V(A) and V(S)
/// inclusive in modulo-8 order.
pub fn nr_valid(nr: u8, va: u8, vs: u8) -> bool {
    distance(va, nr) <= distance(va, vs)
}
