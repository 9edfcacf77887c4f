// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::BTreeMap, time::Duration};

use bytes::BytesMut;
use rand::RngExt;

use crate::models::{
    data::{ContentType, Data},
    interest::Interest,
    manifest::parse_key_value,
    name::Component,
    tlv::{DecodeError, read_element, typ, write_tlv},
};

const STATUS_CODE_KEY: &str = "Status-code";
const RETRY_AFTER_KEY: &str = "Retry-after";

/// Status carried by a negative acknowledgement.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum NackStatus {
    #[default]
    None,
    ProducerDelay,
    DataNotAvailable,
    InterestNotVerified,
}

impl NackStatus {
    fn code(self) -> u32 {
        match self {
            NackStatus::None => 0,
            NackStatus::ProducerDelay => 1,
            NackStatus::DataNotAvailable => 2,
            NackStatus::InterestNotVerified => 3,
        }
    }

    fn from_code(code: u32) -> Self {
        match code {
            1 => NackStatus::ProducerDelay,
            2 => NackStatus::DataNotAvailable,
            3 => NackStatus::InterestNotVerified,
            // unknown codes degrade to None (transient)
            _ => NackStatus::None,
        }
    }
}

/// A producer-issued negative response, rendered as a Data packet with
/// `ContentType::Nack` whose content is a list of `key=value` TLVs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ApplicationNack {
    data: Data,
    key_values: BTreeMap<String, String>,
}

impl ApplicationNack {
    /// Builds a NACK answering `interest`. The name gets a `nack` component
    /// plus a random component so distinct NACKs never collide in caches.
    pub fn for_interest(interest: &Interest, status: NackStatus) -> Self {
        let mut value = BytesMut::with_capacity(8);
        crate::models::tlv::write_nonneg_integer(
            &mut value,
            rand::rng().random::<u64>(),
        );
        let name = interest
            .data_name()
            .appended(Component::generic(&b"nack"[..]))
            .appended(Component::generic(value.freeze()));

        let mut data = Data::new(name);
        data.content_type = ContentType::Nack;

        let mut nack = ApplicationNack {
            data,
            key_values: BTreeMap::new(),
        };
        nack.set_status(status);
        nack
    }

    /// Reads a received NACK back out of a Data packet.
    pub fn from_data(data: &Data) -> Result<Self, DecodeError> {
        if data.content_type != ContentType::Nack {
            return Err(DecodeError::Invalid("content type is not Nack"));
        }

        let mut key_values = BTreeMap::new();
        let mut content: &[u8] = &data.content;
        while !content.is_empty() {
            let (element_type, value) = read_element(&mut content)?;
            if element_type == typ::KEY_VALUE_PAIR
                && let Some((key, value)) = parse_key_value(value)
            {
                key_values.insert(key, value);
            }
        }

        Ok(ApplicationNack {
            data: data.clone(),
            key_values,
        })
    }

    pub fn status(&self) -> NackStatus {
        self.key_values
            .get(STATUS_CODE_KEY)
            .and_then(|value| value.parse::<u32>().ok())
            .map(NackStatus::from_code)
            .unwrap_or_default()
    }

    pub fn set_status(&mut self, status: NackStatus) {
        self.key_values
            .insert(STATUS_CODE_KEY.to_string(), status.code().to_string());
    }

    pub fn retry_after(&self) -> Duration {
        let millis = self
            .key_values
            .get(RETRY_AFTER_KEY)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        Duration::from_millis(millis)
    }

    pub fn set_retry_after(&mut self, delay: Duration) {
        self.key_values.insert(
            RETRY_AFTER_KEY.to_string(),
            (delay.as_millis() as u64).to_string(),
        );
    }

    pub fn value_by_key(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }

    pub fn insert_key_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_values.insert(key.into(), value.into());
    }

    /// Renders the NACK as an unsigned Data packet. `freshness` MUST be
    /// shorter than the producer's regular data freshness; the producer
    /// context enforces `data_freshness / 10 + 1 ms`.
    pub fn into_data(self, freshness: Duration) -> Data {
        let mut content = BytesMut::new();
        for (key, value) in &self.key_values {
            let pair = format!("{key}={value}");
            write_tlv(&mut content, typ::KEY_VALUE_PAIR, pair.as_bytes());
        }

        let mut data = self.data;
        data.freshness = freshness;
        data.content = content.freeze();
        data
    }
}
