// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{ChildSelector, SignatureKind},
    models::name::Name,
};

pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(200);
pub const DEFAULT_DATA_FRESHNESS: Duration = Duration::from_millis(100_000);
pub const DEFAULT_DATA_PACKET_SIZE: usize = 2048;
pub const MAX_DATA_PACKET_SIZE: usize = 8096;
pub const DEFAULT_RCV_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_SND_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_KEY_LOCATOR_SIZE: usize = 256;
pub const DEFAULT_SAFETY_OFFSET: usize = 10;
pub const DEFAULT_MIN_WINDOW_SIZE: u32 = 4;
pub const DEFAULT_MAX_WINDOW_SIZE: u32 = 64;
pub const DEFAULT_FAST_RETX_CONDITION: u32 = 3;
pub const MAX_RETRANSMISSIONS: u32 = 32;
pub const DEFAULT_MAX_EXCLUDED_DIGESTS: usize = 5;
pub const MIN_RTO: Duration = Duration::from_millis(200);
pub const MAX_RTO: Duration = Duration::from_secs(60);

/// Consumer-side configuration.
///
/// One typed field per recognized option; every value is validated once in
/// [`ConsumerConfig::validate_and_normalize`] instead of per-call setter
/// checks.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConsumerConfig {
    #[serde(rename = "Prefix", with = "serde_name")]
    /// Name prefix all retrievals of this context live under.
    pub prefix: Name,

    #[serde(default, rename = "InterestLifetime", with = "serde_opt_millis")]
    /// Pinned request lifetime. `None` tracks the estimator's RTO.
    pub interest_lifetime: Option<Duration>,

    #[serde(default = "defaults::interest_retx", rename = "InterestRetx")]
    /// Retransmission ceiling per segment (0..=32).
    pub interest_retx: u32,

    #[serde(default = "defaults::min_window", rename = "MinWindowSize")]
    pub min_window: u32,

    #[serde(default = "defaults::max_window", rename = "MaxWindowSize")]
    pub max_window: u32,

    #[serde(default, rename = "CurrentWindowSize")]
    /// Window carried over between `consume()` calls; 0 means "start from
    /// scratch".
    pub current_window: u32,

    #[serde(default = "defaults::max_excluded", rename = "MaxExcludedDigests")]
    pub max_excluded_digests: usize,

    #[serde(default, rename = "MustBeFresh")]
    pub must_be_fresh: bool,

    #[serde(default, rename = "MinSuffixComponents")]
    pub min_suffix_components: Option<u32>,

    #[serde(default, rename = "MaxSuffixComponents")]
    pub max_suffix_components: Option<u32>,

    #[serde(default, rename = "ChildSelector")]
    pub child_selector: Option<ChildSelector>,

    #[serde(default, rename = "PublisherKeyLocator", with = "serde_opt_name")]
    pub publisher_key_locator: Option<Name>,
}

impl ConsumerConfig {
    pub fn new(prefix: Name) -> Self {
        ConsumerConfig {
            prefix,
            interest_lifetime: None,
            interest_retx: defaults::interest_retx(),
            min_window: defaults::min_window(),
            max_window: defaults::max_window(),
            current_window: 0,
            max_excluded_digests: defaults::max_excluded(),
            must_be_fresh: false,
            min_suffix_components: None,
            max_suffix_components: None,
            child_selector: None,
            publisher_key_locator: None,
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut cfg: ConsumerConfig =
            serde_yaml::from_str(&raw).context("failed to parse consumer config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.prefix.is_empty(), "Prefix must not be empty");
        ensure!(
            self.interest_retx <= MAX_RETRANSMISSIONS,
            "InterestRetx must be <= {MAX_RETRANSMISSIONS}"
        );
        ensure!(self.min_window >= 1, "MinWindowSize must be >= 1");
        ensure!(
            self.min_window <= self.max_window,
            "MinWindowSize must not exceed MaxWindowSize"
        );
        ensure!(
            self.max_excluded_digests >= 1,
            "MaxExcludedDigests must be >= 1"
        );
        if self.current_window > self.max_window {
            self.current_window = self.max_window;
        }
        Ok(())
    }

    /// Lifetime placed on the wire when no RTO sample exists yet.
    pub fn base_lifetime(&self) -> Duration {
        self.interest_lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME)
    }

    /// Whether the RTO adapter may override the request lifetime.
    pub fn tracks_rtt(&self) -> bool {
        self.interest_lifetime.is_none()
    }
}

/// Producer-side configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ProducerConfig {
    #[serde(rename = "Prefix", with = "serde_name")]
    /// Registered name prefix.
    pub prefix: Name,

    #[serde(default = "defaults::data_packet_size", rename = "DataPacketSize")]
    /// Upper bound for one emitted packet, wire image included.
    pub data_packet_size: usize,

    #[serde(
        default = "defaults::data_freshness",
        rename = "DataFreshness",
        with = "serde_millis"
    )]
    pub data_freshness: Duration,

    #[serde(default = "defaults::rcv_buf", rename = "RcvBufSize")]
    /// Incoming-request queue capacity, in requests.
    pub rcv_buf_size: usize,

    #[serde(default = "defaults::snd_buf", rename = "SndBufSize")]
    /// Send-side content store capacity, in packets.
    pub snd_buf_size: usize,

    #[serde(default, rename = "SignatureType")]
    pub signature_type: SignatureKind,

    #[serde(default, rename = "SigningIdentity", with = "serde_opt_name")]
    /// Identity used with `SignatureType: RSA256`.
    pub signing_identity: Option<Name>,

    #[serde(default, rename = "FastSigning")]
    /// Enables manifest chaining: data segments carry locator self-digests
    /// bound to signed in-stream manifests.
    pub fast_signing: bool,

    #[serde(default = "defaults::key_locator_size", rename = "KeyLocatorSize")]
    /// Key-locator wire estimate used by payload-cap arithmetic.
    pub key_locator_size: usize,

    #[serde(default, rename = "ForwardingStrategy", with = "serde_opt_name")]
    /// Forwarding strategy hint; acting on it is the face's concern.
    pub forwarding_strategy: Option<Name>,
}

impl ProducerConfig {
    pub fn new(prefix: Name) -> Self {
        ProducerConfig {
            prefix,
            data_packet_size: defaults::data_packet_size(),
            data_freshness: defaults::data_freshness(),
            rcv_buf_size: defaults::rcv_buf(),
            snd_buf_size: defaults::snd_buf(),
            signature_type: SignatureKind::default(),
            signing_identity: None,
            fast_signing: false,
            key_locator_size: defaults::key_locator_size(),
            forwarding_strategy: None,
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut cfg: ProducerConfig =
            serde_yaml::from_str(&raw).context("failed to parse producer config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.prefix.is_empty(), "Prefix must not be empty");
        ensure!(
            self.data_packet_size > 0 && self.data_packet_size <= MAX_DATA_PACKET_SIZE,
            "DataPacketSize must be in 1..={MAX_DATA_PACKET_SIZE}"
        );
        ensure!(self.rcv_buf_size >= 1, "RcvBufSize must be >= 1");
        ensure!(self.snd_buf_size >= 1, "SndBufSize must be >= 1");
        if self.signature_type == SignatureKind::Rsa256 {
            ensure!(
                self.signing_identity.is_some(),
                "SigningIdentity is required for RSA256"
            );
        }
        Ok(())
    }

    /// NACKs must expire well before regular packets from the same producer.
    pub fn nack_freshness(&self) -> Duration {
        self.data_freshness / 10 + Duration::from_millis(1)
    }
}

mod defaults {
    use std::time::Duration;

    pub fn interest_retx() -> u32 {
        super::MAX_RETRANSMISSIONS
    }
    pub fn min_window() -> u32 {
        super::DEFAULT_MIN_WINDOW_SIZE
    }
    pub fn max_window() -> u32 {
        super::DEFAULT_MAX_WINDOW_SIZE
    }
    pub fn max_excluded() -> usize {
        super::DEFAULT_MAX_EXCLUDED_DIGESTS
    }
    pub fn data_packet_size() -> usize {
        super::DEFAULT_DATA_PACKET_SIZE
    }
    pub fn data_freshness() -> Duration {
        super::DEFAULT_DATA_FRESHNESS
    }
    pub fn rcv_buf() -> usize {
        super::DEFAULT_RCV_BUFFER_SIZE
    }
    pub fn snd_buf() -> usize {
        super::DEFAULT_SND_BUFFER_SIZE
    }
    pub fn key_locator_size() -> usize {
        super::DEFAULT_KEY_LOCATOR_SIZE
    }
}

/// Serde helpers representing `Duration` as milliseconds.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

mod serde_opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Serde helpers representing a [`Name`] as a `/`-delimited string.
mod serde_name {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::models::name::Name;

    pub fn serialize<S: Serializer>(name: &Name, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&name.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Name, D::Error> {
        let raw = String::deserialize(d)?;
        Name::from_str(&raw).map_err(D::Error::custom)
    }
}

mod serde_opt_name {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::models::name::Name;

    pub fn serialize<S: Serializer>(
        name: &Option<Name>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match name {
            Some(name) => s.serialize_some(&name.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Name>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|raw| Name::from_str(&raw).map_err(D::Error::custom))
            .transpose()
    }
}

/// Convenience for tests and demos: prefix-only consumer config.
impl FromStr for ConsumerConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = Name::from_str(s)?;
        let mut cfg = ConsumerConfig::new(prefix);
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }
}
