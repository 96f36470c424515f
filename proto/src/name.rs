// SPDX-License-Identifier: MIT

/// The TPM-canonical `Name` of an object: an algorithm identifier followed
/// by the digest of the object's public area. Opaque to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Name(pub Vec<u8>);

impl Name {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Name {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
