// SPDX-License-Identifier: MIT

use crate::Algorithm;
use core::fmt;

/// The subset of `TPM_ALG_ID` values usable as a session's `authHash`.
///
/// Every digest inside one authorization session shares one of these
/// algorithms; the session never mixes hash algorithms mid-exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Output length in bytes of a digest produced by this algorithm.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl From<HashAlg> for Algorithm {
    fn from(alg: HashAlg) -> Self {
        match alg {
            HashAlg::Sha1 => Algorithm::Sha1,
            HashAlg::Sha256 => Algorithm::Sha256,
            HashAlg::Sha384 => Algorithm::Sha384,
            HashAlg::Sha512 => Algorithm::Sha512,
        }
    }
}

impl TryFrom<Algorithm> for HashAlg {
    type Error = UnsupportedHashAlg;

    fn try_from(alg: Algorithm) -> Result<Self, Self::Error> {
        match alg {
            Algorithm::Sha1 => Ok(Self::Sha1),
            Algorithm::Sha256 => Ok(Self::Sha256),
            Algorithm::Sha384 => Ok(Self::Sha384),
            Algorithm::Sha512 => Ok(Self::Sha512),
            _ => Err(UnsupportedHashAlg),
        }
    }
}

/// An `Algorithm` that is not one of the four hash algorithms a session can
/// use as its `authHash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedHashAlg;

impl fmt::Display for UnsupportedHashAlg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "algorithm is not a supported session hash")
    }
}

impl std::error::Error for UnsupportedHashAlg {}
