// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Signature scheme applied to produced segments.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureKind {
    /// Integrity-only self digest (SHA-256 over the signed portion).
    #[serde(rename = "SHA256", alias = "sha256")]
    #[default]
    Sha256,
    /// Asymmetric signature produced by the application-provided signer.
    #[serde(rename = "RSA256", alias = "rsa256")]
    Rsa256,
}

impl SignatureKind {
    /// On-wire signature value estimate used by the segmenter's payload
    /// arithmetic.
    pub fn signature_size(self) -> usize {
        match self {
            SignatureKind::Sha256 | SignatureKind::Rsa256 => 32,
        }
    }
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignatureKind::Sha256 => "SHA256",
            SignatureKind::Rsa256 => "RSA256",
        })
    }
}

/// Tie-break rule when several stored packets match one request.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildSelector {
    #[serde(rename = "Leftmost", alias = "leftmost")]
    #[default]
    Leftmost,
    #[serde(rename = "Rightmost", alias = "rightmost")]
    Rightmost,
}

impl fmt::Display for ChildSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChildSelector::Leftmost => "Leftmost",
            ChildSelector::Rightmost => "Rightmost",
        })
    }
}

/// Prefix registration lifecycle on the producer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationStatus {
    #[default]
    NotAttempted,
    InProgress,
    Success,
    Failure,
}

impl RegistrationStatus {
    pub fn is_success(self) -> bool {
        matches!(self, RegistrationStatus::Success)
    }
}
