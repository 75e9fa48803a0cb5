//! Cryptographic value types
//!
//! Velum never implements OpenPGP itself; the primitives live behind
//! [`crate::effects::pgp::PgpProvider`]. This module defines the value types
//! that cross that boundary: armored payloads, unlocked key handles, session
//! keys, and the verification results attached to decrypted records.

pub mod keys;
pub mod verification;
