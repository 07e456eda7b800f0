//! IPv4 addresses, prefixes and integer ranges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// An IPv4 address stored as its 32-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ip(pub u32);

impl Ip {
    pub const ZERO: Ip = Ip(0);

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl FromStr for Ip {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split('.').collect();
        if octets.len() != 4 {
            return Err(ConfigError::InvalidIp(s.to_string()));
        }
        let mut value = 0u32;
        for octet in octets {
            let byte: u8 = octet
                .parse()
                .map_err(|_| ConfigError::InvalidIp(s.to_string()))?;
            value = (value << 8) | u32::from(byte);
        }
        Ok(Ip(value))
    }
}

impl TryFrom<String> for Ip {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ip> for String {
    fn from(ip: Ip) -> Self {
        ip.to_string()
    }
}

fn mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(len))
    }
}

/// A network prefix. The address is always normalized to the network
/// address, so `10.0.0.1/24` parses to `10.0.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    network: Ip,
    length: u8,
}

impl Prefix {
    pub fn new(ip: Ip, length: u8) -> Result<Self, ConfigError> {
        if length > 32 {
            return Err(ConfigError::InvalidPrefix(format!("{ip}/{length}")));
        }
        Ok(Prefix {
            network: Ip(ip.0 & mask(length)),
            length,
        })
    }

    /// The single-address prefix `ip/32`.
    pub fn host(ip: Ip) -> Self {
        Prefix {
            network: ip,
            length: 32,
        }
    }

    pub fn network(&self) -> Ip {
        self.network
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    /// First address covered by the prefix.
    pub fn start(&self) -> i64 {
        self.network.as_i64()
    }

    /// One past the last address covered by the prefix.
    pub fn end_exclusive(&self) -> i64 {
        self.start() + (1i64 << (32 - u32::from(self.length)))
    }

    pub fn contains_ip(&self, ip: Ip) -> bool {
        ip.0 & mask(self.length) == self.network.0
    }

    /// True when every address of `other` is also in `self`.
    pub fn contains_prefix(&self, other: &Prefix) -> bool {
        other.length >= self.length && self.contains_ip(other.network)
    }

    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.contains_prefix(other) || other.contains_prefix(self)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.length)
    }
}

fn split_slash(s: &str) -> Result<(Ip, u8), ConfigError> {
    let (ip, len) = s
        .trim()
        .split_once('/')
        .ok_or_else(|| ConfigError::InvalidPrefix(s.to_string()))?;
    let ip: Ip = ip.parse()?;
    let len: u8 = len
        .parse()
        .map_err(|_| ConfigError::InvalidPrefix(s.to_string()))?;
    if len > 32 {
        return Err(ConfigError::InvalidPrefix(s.to_string()));
    }
    Ok((ip, len))
}

impl FromStr for Prefix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains('/') {
            return Ok(Prefix::host(s.parse()?));
        }
        let (ip, len) = split_slash(s)?;
        Prefix::new(ip, len)
    }
}

impl TryFrom<String> for Prefix {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Prefix> for String {
    fn from(p: Prefix) -> Self {
        p.to_string()
    }
}

/// An interface address: a host address together with its subnet length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceAddress {
    pub ip: Ip,
    pub length: u8,
}

impl InterfaceAddress {
    pub fn prefix(&self) -> Prefix {
        Prefix {
            network: Ip(self.ip.0 & mask(self.length)),
            length: self.length,
        }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.length)
    }
}

impl FromStr for InterfaceAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, length) = split_slash(s)?;
        Ok(InterfaceAddress { ip, length })
    }
}

impl TryFrom<String> for InterfaceAddress {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InterfaceAddress> for String {
    fn from(a: InterfaceAddress) -> Self {
        a.to_string()
    }
}

/// Inclusive integer range, used for ports, ICMP values and prefix lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubRange {
    pub start: i64,
    pub end: i64,
}

impl SubRange {
    pub fn new(start: i64, end: i64) -> Self {
        SubRange { start, end }
    }

    pub fn single(value: i64) -> Self {
        SubRange {
            start: value,
            end: value,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.start <= value && value <= self.end
    }
}

/// A prefix together with the range of prefix lengths it matches, as used
/// by prefix lists (`10.0.0.0/8 ge 16 le 24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrefixRange {
    pub prefix: Prefix,
    pub min_length: u8,
    pub max_length: u8,
}

impl PrefixRange {
    /// Matches exactly `prefix`.
    pub fn exact(prefix: Prefix) -> Self {
        PrefixRange {
            prefix,
            min_length: prefix.length(),
            max_length: prefix.length(),
        }
    }

    /// Matches `prefix` and every more-specific prefix inside it.
    pub fn orlonger(prefix: Prefix) -> Self {
        PrefixRange {
            prefix,
            min_length: prefix.length(),
            max_length: 32,
        }
    }

    /// Concrete membership test for a candidate prefix.
    pub fn includes(&self, candidate: &Prefix) -> bool {
        self.prefix.contains_prefix(candidate)
            && candidate.length() >= self.min_length
            && candidate.length() <= self.max_length
    }
}
