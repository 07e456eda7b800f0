//! Vendor-neutral router configuration model.
//!
//! A [`Network`] is a set of [`Configuration`]s, one per router, already
//! parsed from vendor syntax. Everything here is plain data with `serde`
//! support so networks can be stored and exchanged as JSON.

pub mod acl;
pub mod device;
pub mod ip;
pub mod policy;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use acl::{
    HeaderSpace, IpAccessList, IpAccessListLine, TcpFlags, IP_PROTOCOL_ICMP, IP_PROTOCOL_TCP,
    IP_PROTOCOL_UDP,
};
pub use device::{
    BgpNeighbor, BgpProcess, Configuration, GeneratedRoute, Interface, OspfProcess, StaticRoute,
    DEFAULT_REFERENCE_BANDWIDTH, NULL_INTERFACE_NAME,
};
pub use ip::{InterfaceAddress, Ip, Prefix, PrefixRange, SubRange};
pub use policy::{
    AsPathListExpr, BooleanExpr, CommunityList, CommunityListLine, CommunitySetExpr, LineAction,
    LongExpr, OspfMetricType, PrefixSetExpr, RouteFilterLine, RouteFilterList, RoutingPolicy,
    RoutingProtocol, Statement,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),
    #[error("duplicate router hostname: {0}")]
    DuplicateHostname(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed network JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// All router configurations of the network under analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NetworkFile", into = "NetworkFile")]
pub struct Network {
    configurations: BTreeMap<String, Configuration>,
}

#[derive(Serialize, Deserialize)]
struct NetworkFile {
    configurations: Vec<Configuration>,
}

impl TryFrom<NetworkFile> for Network {
    type Error = ConfigError;

    fn try_from(file: NetworkFile) -> Result<Self, Self::Error> {
        Network::new(file.configurations)
    }
}

impl From<Network> for NetworkFile {
    fn from(network: Network) -> Self {
        NetworkFile {
            configurations: network.configurations.into_values().collect(),
        }
    }
}

impl Network {
    pub fn new(configurations: Vec<Configuration>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for conf in configurations {
            let name = conf.hostname.clone();
            if map.insert(name.clone(), conf).is_some() {
                return Err(ConfigError::DuplicateHostname(name));
            }
        }
        Ok(Network {
            configurations: map,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Configurations keyed by hostname, in name order.
    pub fn configurations(&self) -> &BTreeMap<String, Configuration> {
        &self.configurations
    }

    pub fn get(&self, hostname: &str) -> Option<&Configuration> {
        self.configurations.get(hostname)
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}
