// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cmp::Ordering, fmt, str::FromStr};

use bytes::{Bytes, BytesMut};

use crate::models::tlv::{
    self, DecodeError, nonneg_integer_len, read_element, read_nonneg_integer, tlv_len,
    typ, write_nonneg_integer, write_tlv,
};

pub const DIGEST_SIZE: usize = 32;

/// One name component.
///
/// Canonical subtypes: opaque generic bytes, a non-negative segment number
/// (minimum-length big-endian on the wire) and an implicit SHA-256 digest of
/// a full Data wire image.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Component {
    Generic(Bytes),
    Segment(u64),
    ImplicitDigest([u8; DIGEST_SIZE]),
}

impl Component {
    pub fn generic(bytes: impl Into<Bytes>) -> Self {
        Component::Generic(bytes.into())
    }

    pub const fn segment(seg: u64) -> Self {
        Component::Segment(seg)
    }

    pub const fn implicit_digest(digest: [u8; DIGEST_SIZE]) -> Self {
        Component::ImplicitDigest(digest)
    }

    pub fn as_segment(&self) -> Option<u64> {
        match self {
            Component::Segment(seg) => Some(*seg),
            _ => None,
        }
    }

    pub fn as_implicit_digest(&self) -> Option<&[u8; DIGEST_SIZE]> {
        match self {
            Component::ImplicitDigest(digest) => Some(digest),
            _ => None,
        }
    }

    fn wire_type(&self) -> u64 {
        match self {
            Component::Generic(_) => typ::GENERIC_COMPONENT,
            Component::Segment(_) => typ::SEGMENT_COMPONENT,
            Component::ImplicitDigest(_) => typ::IMPLICIT_SHA256_DIGEST_COMPONENT,
        }
    }

    fn value_len(&self) -> usize {
        match self {
            Component::Generic(bytes) => bytes.len(),
            Component::Segment(seg) => nonneg_integer_len(*seg),
            Component::ImplicitDigest(_) => DIGEST_SIZE,
        }
    }

    pub fn encoded_len(&self) -> usize {
        tlv_len(self.wire_type(), self.value_len())
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Component::Generic(bytes) => write_tlv(buf, typ::GENERIC_COMPONENT, bytes),
            Component::Segment(seg) => {
                let mut value = BytesMut::with_capacity(8);
                write_nonneg_integer(&mut value, *seg);
                write_tlv(buf, typ::SEGMENT_COMPONENT, &value);
            },
            Component::ImplicitDigest(digest) => {
                write_tlv(buf, typ::IMPLICIT_SHA256_DIGEST_COMPONENT, digest);
            },
        }
    }

    pub fn decode(wire_type: u64, value: &[u8]) -> Result<Self, DecodeError> {
        match wire_type {
            typ::GENERIC_COMPONENT => {
                Ok(Component::Generic(Bytes::copy_from_slice(value)))
            },
            typ::SEGMENT_COMPONENT => Ok(Component::Segment(read_nonneg_integer(value)?)),
            typ::IMPLICIT_SHA256_DIGEST_COMPONENT => {
                if value.len() != DIGEST_SIZE {
                    return Err(DecodeError::BadLength {
                        typ: wire_type,
                        len: value.len(),
                    });
                }
                let mut digest = [0u8; DIGEST_SIZE];
                digest.copy_from_slice(value);
                Ok(Component::ImplicitDigest(digest))
            },
            other => Err(DecodeError::UnexpectedType {
                expected: typ::GENERIC_COMPONENT,
                got: other,
            }),
        }
    }

    fn value_bytes(&self) -> Vec<u8> {
        match self {
            Component::Generic(bytes) => bytes.to_vec(),
            Component::Segment(seg) => {
                let mut buf = BytesMut::with_capacity(8);
                write_nonneg_integer(&mut buf, *seg);
                buf.to_vec()
            },
            Component::ImplicitDigest(digest) => digest.to_vec(),
        }
    }
}

// Canonical NDN component order: numeric type first, then value length,
// then value bytes.
impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wire_type()
            .cmp(&other.wire_type())
            .then_with(|| self.value_len().cmp(&other.value_len()))
            .then_with(|| self.value_bytes().cmp(&other.value_bytes()))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Generic(bytes) => {
                write!(f, "{}", String::from_utf8_lossy(bytes))
            },
            Component::Segment(seg) => write!(f, "seg={seg}"),
            Component::ImplicitDigest(digest) => {
                write!(f, "sha256digest={}", hex::encode(&digest[..8]))
            },
        }
    }
}

/// Ordered sequence of opaque components.
///
/// `Ord` is the canonical NDN name order: a proper prefix sorts before any
/// of its extensions (`Vec` lexicographic order over canonical components).
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    pub fn new() -> Self {
        Name::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }

    #[must_use]
    pub fn appended(mut self, component: Component) -> Self {
        self.push(component);
        self
    }

    /// Appends all components of `suffix`.
    pub fn append(&mut self, suffix: &Name) {
        self.components.extend(suffix.components.iter().cloned());
    }

    pub fn append_segment(&mut self, seg: u64) {
        self.push(Component::Segment(seg));
    }

    #[must_use]
    pub fn with_segment(mut self, seg: u64) -> Self {
        self.append_segment(seg);
        self
    }

    /// Trailing segment number, if the last component is a segment.
    pub fn trailing_segment(&self) -> Option<u64> {
        self.last().and_then(Component::as_segment)
    }

    /// First `n` components as a new name.
    pub fn prefix(&self, n: usize) -> Name {
        Name {
            components: self.components[..n.min(self.components.len())].to_vec(),
        }
    }

    /// All but the last component.
    pub fn parent(&self) -> Name {
        self.prefix(self.len().saturating_sub(1))
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.len() >= self.components.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }

    pub fn encoded_len(&self) -> usize {
        let inner: usize = self.components.iter().map(Component::encoded_len).sum();
        tlv_len(typ::NAME, inner)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let mut inner = BytesMut::new();
        for component in &self.components {
            component.encode(&mut inner);
        }
        write_tlv(buf, typ::NAME, &inner);
    }

    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes the value of a Name TLV element.
    pub fn decode_value(mut value: &[u8]) -> Result<Self, DecodeError> {
        let mut components = Vec::new();
        while !value.is_empty() {
            let (wire_type, component_value) = read_element(&mut value)?;
            components.push(Component::decode(wire_type, component_value)?);
        }
        Ok(Name { components })
    }

    /// Decodes a full Name TLV (type + length + value), advancing the input.
    pub fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let value = tlv::expect_element(input, typ::NAME)?;
        Name::decode_value(value)
    }
}

impl FromStr for Name {
    type Err = DecodeError;

    /// Parses a `/`-delimited URI-ish string into generic components.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut name = Name::new();
        for part in s.split('/').filter(|p| !p.is_empty()) {
            name.push(Component::generic(part.as_bytes().to_vec()));
        }
        Ok(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{component:?}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
