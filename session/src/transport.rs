// SPDX-License-Identifier: MIT

use crate::error::Result;
use tpm2_proto::ResponseCode;

/// The request/response collaborator the session core drives. A command
/// buffer goes in, a response buffer and response code come out.
///
/// Implementations own serialization to the TSS2 wire format and the
/// physical (or simulated) channel to the TPM; this crate only ever sees
/// already-serialized bytes.
pub trait Transport {
    /// Sends `cmd` and blocks for the response. The only suspension point
    /// in the whole session core.
    fn send(&mut self, cmd: &[u8]) -> Result<(Vec<u8>, ResponseCode)>;
}
