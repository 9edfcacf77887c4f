// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::models::{
    data::{Data, SignatureType},
    name::{DIGEST_SIZE, Name},
};

/// Signing seam between the data-transfer core and whatever key management
/// the application brings.
///
/// The core calls `sign_sha256` for integrity-only self digests and
/// `sign_by_identity` when an asymmetric signature was requested. Both
/// mutate the packet in place (signature info + value).
pub trait Signer: Send + Sync {
    /// Sets the signature type to self-digest and fills the value with
    /// SHA-256 over the signed portion.
    fn sign_sha256(&self, data: &mut Data) -> Result<()>;

    /// Asymmetric signing under `identity`. The default keyless signer
    /// refuses this.
    fn sign_by_identity(&self, data: &mut Data, identity: &Name) -> Result<()>;

    /// Signature check for a received packet.
    fn verify(&self, data: &Data) -> bool;
}

/// SHA-256 over an arbitrary wire image.
pub fn sha256(bytes: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn self_digest(data: &Data) -> [u8; DIGEST_SIZE] {
    sha256(&data.signed_portion())
}

/// Recomputes the self digest and compares it to the carried value.
/// Packets with a non-digest signature type are not checkable here and
/// report `false`.
pub fn verify_self_digest(data: &Data) -> bool {
    data.signature_info.typ == SignatureType::DigestSha256
        && data.signature_value.as_ref() == self_digest(data).as_slice()
}

/// Keyless signer: integrity digests only.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Signer;

impl Signer for Sha256Signer {
    fn sign_sha256(&self, data: &mut Data) -> Result<()> {
        data.signature_info.typ = SignatureType::DigestSha256;
        data.signature_value = Bytes::copy_from_slice(&self_digest(data));
        Ok(())
    }

    fn sign_by_identity(&self, data: &mut Data, identity: &Name) -> Result<()> {
        anyhow::bail!("Sha256Signer holds no keys (identity {identity})")
    }

    fn verify(&self, data: &Data) -> bool {
        verify_self_digest(data)
    }
}
