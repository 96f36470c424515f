// SPDX-License-Identifier: MIT

use bitflags::bitflags;

bitflags! {
    /// `TPMA_SESSION`
    pub struct SessionAttributes: u8 {
        /// Session remains active after the command completes
        const ContinueSession = 0x01;
        /// Session is used for audit and may be the only audit session
        const AuditExclusive = 0x02;
        /// Audit digest should be reset
        const AuditReset = 0x04;
        /// First parameter in the command is decrypted by this session
        const Decrypt = 0x20;
        /// First parameter in the response is encrypted by this session
        const Encrypt = 0x40;
        /// Session is for audit
        const Audit = 0x80;
    }
}

impl Default for SessionAttributes {
    fn default() -> Self {
        Self::ContinueSession
    }
}
