use std::fmt;

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Globally unique 128-bit identifier of one binding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId([u8; 16]);

impl BindingId {
    /// Builds a random (version 4, RFC 4122 variant) identifier from 16 bytes of entropy.
    pub fn from_random_bytes(mut bytes: [u8; 16]) -> Self {
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[inline]
    pub const fn as_u128(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13],
            b[14], b[15]
        )
    }
}

impl fmt::Debug for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingId({self})")
    }
}

#[derive(Debug, Error)]
#[error("Identifier source failed: {0}")]
pub struct IdentityError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl IdentityError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

impl From<rand::Error> for IdentityError {
    fn from(e: rand::Error) -> Self {
        Self::new(e)
    }
}

/// Produces binding identifiers.
pub trait IdentitySource: fmt::Debug + Send + Sync {
    fn generate(&self) -> Result<BindingId, IdentityError>;
}

/// Draws identifiers from the operating system's random number generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngIdentity;

impl IdentitySource for OsRngIdentity {
    fn generate(&self) -> Result<BindingId, IdentityError> {
        let mut bytes = [0u8; 16];
        OsRng.try_fill_bytes(&mut bytes)?;

        Ok(BindingId::from_random_bytes(bytes))
    }
}
