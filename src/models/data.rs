// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::models::{
    name::{Component, DIGEST_SIZE, Name},
    tlv::{
        self, DecodeError, read_element, read_nonneg_integer, typ, write_nonneg_integer,
        write_tlv,
    },
};

/// Payload kind carried by a response packet.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ContentType {
    #[default]
    Blob,
    Nack,
    Manifest,
}

impl ContentType {
    fn to_wire(self) -> u64 {
        match self {
            ContentType::Blob => 0,
            ContentType::Nack => 3,
            ContentType::Manifest => 4,
        }
    }

    fn from_wire(value: u64) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(ContentType::Blob),
            3 => Ok(ContentType::Nack),
            4 => Ok(ContentType::Manifest),
            _ => Err(DecodeError::Invalid("unknown content type")),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SignatureType {
    #[default]
    DigestSha256,
    Sha256WithRsa,
}

impl SignatureType {
    fn to_wire(self) -> u64 {
        match self {
            SignatureType::DigestSha256 => 0,
            SignatureType::Sha256WithRsa => 1,
        }
    }

    fn from_wire(value: u64) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(SignatureType::DigestSha256),
            1 => Ok(SignatureType::Sha256WithRsa),
            _ => Err(DecodeError::Invalid("unknown signature type")),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SignatureInfo {
    pub typ: SignatureType,
    pub key_locator: Option<Name>,
}

/// A response packet ("Data").
///
/// The wire encoding is canonical: encoding the same fields always yields
/// the same bytes, so implicit digests are stable.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Data {
    pub name: Name,
    pub content_type: ContentType,
    pub freshness: Duration,
    pub final_block: Option<Component>,
    pub content: Bytes,
    pub signature_info: SignatureInfo,
    pub signature_value: Bytes,
}

impl Data {
    pub fn new(name: Name) -> Self {
        Data {
            name,
            content_type: ContentType::Blob,
            freshness: Duration::ZERO,
            final_block: None,
            content: Bytes::new(),
            signature_info: SignatureInfo::default(),
            signature_value: Bytes::new(),
        }
    }

    pub fn trailing_segment(&self) -> Option<u64> {
        self.name.trailing_segment()
    }

    pub fn final_block_segment(&self) -> Option<u64> {
        self.final_block.as_ref().and_then(Component::as_segment)
    }

    /// Whether this packet is the terminal segment of its ADU.
    pub fn is_terminal(&self) -> bool {
        match (self.trailing_segment(), self.final_block_segment()) {
            (Some(seg), Some(last)) => seg == last,
            _ => false,
        }
    }

    fn encode_meta_info(&self) -> BytesMut {
        let mut meta = BytesMut::new();
        let mut content_type = BytesMut::with_capacity(8);
        write_nonneg_integer(&mut content_type, self.content_type.to_wire());
        write_tlv(&mut meta, typ::CONTENT_TYPE, &content_type);

        let mut freshness = BytesMut::with_capacity(8);
        write_nonneg_integer(&mut freshness, self.freshness.as_millis() as u64);
        write_tlv(&mut meta, typ::FRESHNESS_PERIOD, &freshness);

        if let Some(final_block) = &self.final_block {
            let mut inner = BytesMut::with_capacity(final_block.encoded_len());
            final_block.encode(&mut inner);
            write_tlv(&mut meta, typ::FINAL_BLOCK_ID, &inner);
        }
        meta
    }

    fn encode_signature_info(&self) -> BytesMut {
        let mut info = BytesMut::new();
        let mut sig_type = BytesMut::with_capacity(8);
        write_nonneg_integer(&mut sig_type, self.signature_info.typ.to_wire());
        write_tlv(&mut info, typ::SIGNATURE_TYPE, &sig_type);

        if let Some(locator) = &self.signature_info.key_locator {
            let mut inner = BytesMut::with_capacity(locator.encoded_len());
            locator.encode(&mut inner);
            write_tlv(&mut info, typ::KEY_LOCATOR, &inner);
        }
        info
    }

    /// Every encoded field except the SignatureValue element. This is the
    /// input of self-digest signatures.
    pub fn signed_portion(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.name.encode(&mut buf);
        write_tlv(&mut buf, typ::META_INFO, &self.encode_meta_info());
        write_tlv(&mut buf, typ::CONTENT, &self.content);
        write_tlv(&mut buf, typ::SIGNATURE_INFO, &self.encode_signature_info());
        buf.freeze()
    }

    /// Full canonical wire image.
    pub fn wire_encode(&self) -> Bytes {
        let signed = self.signed_portion();
        let mut inner =
            BytesMut::with_capacity(signed.len() + self.signature_value.len() + 4);
        inner.extend_from_slice(&signed);
        write_tlv(&mut inner, typ::SIGNATURE_VALUE, &self.signature_value);

        let mut buf = BytesMut::with_capacity(tlv::tlv_len(typ::DATA, inner.len()));
        write_tlv(&mut buf, typ::DATA, &inner);
        buf.freeze()
    }

    /// SHA-256 of the full wire image (the "implicit digest").
    pub fn wire_digest(&self) -> [u8; DIGEST_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(self.wire_encode());
        hasher.finalize().into()
    }

    pub fn decode(wire: &[u8]) -> Result<Self, DecodeError> {
        let mut input = wire;
        let mut body = tlv::expect_element(&mut input, typ::DATA)?;

        let name = Name::decode(&mut body)?;
        let mut data = Data::new(name);

        let mut meta = tlv::expect_element(&mut body, typ::META_INFO)?;
        while !meta.is_empty() {
            let (element_type, value) = read_element(&mut meta)?;
            match element_type {
                typ::CONTENT_TYPE => {
                    data.content_type = ContentType::from_wire(read_nonneg_integer(value)?)?;
                },
                typ::FRESHNESS_PERIOD => {
                    data.freshness = Duration::from_millis(read_nonneg_integer(value)?);
                },
                typ::FINAL_BLOCK_ID => {
                    let mut inner = value;
                    let (component_type, component_value) = read_element(&mut inner)?;
                    data.final_block =
                        Some(Component::decode(component_type, component_value)?);
                },
                // unknown meta elements are skipped
                _ => {},
            }
        }

        data.content =
            Bytes::copy_from_slice(tlv::expect_element(&mut body, typ::CONTENT)?);

        let mut info = tlv::expect_element(&mut body, typ::SIGNATURE_INFO)?;
        while !info.is_empty() {
            let (element_type, value) = read_element(&mut info)?;
            match element_type {
                typ::SIGNATURE_TYPE => {
                    data.signature_info.typ =
                        SignatureType::from_wire(read_nonneg_integer(value)?)?;
                },
                typ::KEY_LOCATOR => {
                    let mut inner = value;
                    data.signature_info.key_locator = Some(Name::decode(&mut inner)?);
                },
                _ => {},
            }
        }

        data.signature_value =
            Bytes::copy_from_slice(tlv::expect_element(&mut body, typ::SIGNATURE_VALUE)?);

        Ok(data)
    }
}
