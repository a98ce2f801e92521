//! Component I: the randomness capability seam, used exclusively by the
//! Violation Store to mint UUID v4 ids (§4.G). Production wires this to
//! the OS RNG; the simulator wires it to a seeded PRNG so a failing run
//! can be replayed bit-for-bit from its seed.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

pub trait Rand: Send + Sync {
    fn next_u64(&self) -> u64;

    /// Builds a UUID v4 from two draws of `next_u64`, setting the version
    /// and variant bits per RFC 4122. Implemented in terms of `next_u64`
    /// alone so the trait object stays a single narrow method.
    fn next_uuid_v4(&self) -> Uuid {
        let hi = self.next_u64();
        let lo = self.next_u64();
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&hi.to_be_bytes());
        bytes[8..].copy_from_slice(&lo.to_be_bytes());
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Uuid::from_bytes(bytes)
    }
}

/// Wires to the OS RNG via `uuid`'s own generator. The only production
/// implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRand;

impl Rand for SystemRand {
    fn next_u64(&self) -> u64 {
        // uuid::Uuid::new_v4 already draws from the OS CSPRNG; we fold its
        // bytes down to a u64 so SystemRand still satisfies the narrow
        // `next_u64` contract every other Rand impl uses.
        let bytes = *Uuid::new_v4().as_bytes();
        u64::from_be_bytes(bytes[0..8].try_into().unwrap())
    }

    fn next_uuid_v4(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// A deterministic xorshift64* generator, seeded explicitly. Used by unit
/// tests and as the building block for the simulator's seeded PRNG.
#[derive(Debug)]
pub struct SeededRand {
    state: AtomicU64,
}

impl SeededRand {
    pub fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(if seed == 0 { 0x9E3779B97F4A7C15 } else { seed }),
        }
    }
}

impl Rand for SeededRand {
    fn next_u64(&self) -> u64 {
        // xorshift64* — fast, deterministic, good enough statistical
        // quality for workload generation and fault-injection sampling.
        let mut x = self.state.load(Ordering::Relaxed);
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state.store(x, Ordering::Relaxed);
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }
}
