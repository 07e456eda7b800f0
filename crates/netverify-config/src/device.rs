//! Per-router configuration: interfaces, routing processes and routes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::acl::IpAccessList;
use crate::ip::{InterfaceAddress, Ip, Prefix};
use crate::policy::{CommunityList, RouteFilterList, RoutingPolicy};

/// Interface name that marks a static route as discarding traffic.
pub const NULL_INTERFACE_NAME: &str = "null_interface";

/// Bandwidth assumed for interfaces that do not configure one (100 Mbit/s).
pub const DEFAULT_BANDWIDTH: f64 = 1e8;

/// OSPF reference bandwidth when the process does not set one.
pub const DEFAULT_REFERENCE_BANDWIDTH: f64 = 1e8;

fn default_true() -> bool {
    true
}

fn default_admin_cost() -> u32 {
    1
}

fn default_reference_bandwidth() -> f64 {
    DEFAULT_REFERENCE_BANDWIDTH
}

/// The structured configuration of one router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub hostname: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub bgp: Option<BgpProcess>,
    #[serde(default)]
    pub ospf: Option<OspfProcess>,
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
    #[serde(default)]
    pub generated_routes: Vec<GeneratedRoute>,
    #[serde(default)]
    pub routing_policies: BTreeMap<String, RoutingPolicy>,
    #[serde(default)]
    pub community_lists: BTreeMap<String, CommunityList>,
    #[serde(default)]
    pub route_filter_lists: BTreeMap<String, RouteFilterList>,
    #[serde(default)]
    pub ip_access_lists: BTreeMap<String, IpAccessList>,
}

impl Configuration {
    pub fn new(hostname: impl Into<String>) -> Self {
        Configuration {
            hostname: hostname.into(),
            ..Configuration::default()
        }
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// OSPF areas the router participates in, taken from its
    /// OSPF-enabled interfaces.
    pub fn ospf_areas(&self) -> BTreeSet<u64> {
        if self.ospf.is_none() {
            return BTreeSet::new();
        }
        self.interfaces
            .iter()
            .filter(|i| i.ospf_enabled)
            .filter_map(|i| i.ospf_area)
            .collect()
    }

    /// The router id used for BGP tie-breaking, falling back to OSPF.
    pub fn router_id(&self) -> Option<Ip> {
        self.bgp
            .as_ref()
            .map(|b| b.router_id)
            .or_else(|| self.ospf.as_ref().map(|o| o.router_id))
    }
}

/// A router interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub address: Option<InterfaceAddress>,
    #[serde(default)]
    pub bandwidth: Option<f64>,
    #[serde(default)]
    pub ospf_enabled: bool,
    #[serde(default)]
    pub ospf_cost: Option<u32>,
    #[serde(default)]
    pub ospf_area: Option<u64>,
    /// Name of the ACL applied to packets arriving on this interface.
    #[serde(default)]
    pub incoming_filter: Option<String>,
    /// Name of the ACL applied to packets leaving through this interface.
    #[serde(default)]
    pub outgoing_filter: Option<String>,
    #[serde(default)]
    pub loopback: bool,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Interface {
            name: name.into(),
            active: true,
            address: None,
            bandwidth: None,
            ospf_enabled: false,
            ospf_cost: None,
            ospf_area: None,
            incoming_filter: None,
            outgoing_filter: None,
            loopback: false,
        }
    }

    pub fn with_address(mut self, address: InterfaceAddress) -> Self {
        self.address = Some(address);
        self
    }

    pub fn prefix(&self) -> Option<Prefix> {
        self.address.map(|a| a.prefix())
    }

    pub fn is_loopback(&self) -> bool {
        self.loopback || self.name.to_ascii_lowercase().starts_with("lo")
    }

    /// OSPF cost: the configured value, else `reference / bandwidth`
    /// rounded down and clamped to at least 1. VLAN interfaces default to 1.
    pub fn effective_ospf_cost(&self, reference_bandwidth: f64) -> u32 {
        if let Some(cost) = self.ospf_cost {
            return cost;
        }
        if self.name.to_ascii_lowercase().starts_with("vlan") {
            return 1;
        }
        let bandwidth = self.bandwidth.unwrap_or(DEFAULT_BANDWIDTH);
        if bandwidth <= 0.0 {
            return 1;
        }
        let cost = (reference_bandwidth / bandwidth).floor();
        if cost < 1.0 {
            1
        } else if cost > f64::from(u32::MAX) {
            u32::MAX
        } else {
            cost as u32
        }
    }
}

/// BGP process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpProcess {
    pub router_id: Ip,
    #[serde(default)]
    pub neighbors: Vec<BgpNeighbor>,
    #[serde(default)]
    pub multipath_ebgp: bool,
    #[serde(default)]
    pub multipath_ibgp: bool,
    /// Route-filter list whose lines are the networks this router originates.
    #[serde(default)]
    pub network_list: Option<String>,
    /// Routing policy applied to every export in addition to per-neighbor policy.
    #[serde(default)]
    pub common_export_policy: Option<String>,
}

/// One configured BGP session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    /// Peer address, usually a /32.
    pub address: Prefix,
    pub local_as: u32,
    pub remote_as: u32,
    #[serde(default)]
    pub local_ip: Option<Ip>,
    #[serde(default)]
    pub import_policy: Option<String>,
    #[serde(default)]
    pub export_policy: Option<String>,
    #[serde(default)]
    pub route_reflector_client: bool,
    #[serde(default)]
    pub send_community: bool,
}

impl BgpNeighbor {
    pub fn is_ibgp(&self) -> bool {
        self.local_as == self.remote_as
    }
}

/// OSPF process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfProcess {
    pub router_id: Ip,
    #[serde(default = "default_reference_bandwidth")]
    pub reference_bandwidth: f64,
    #[serde(default)]
    pub export_policy: Option<String>,
}

/// A static route. Exactly one of `next_hop_interface` and `next_hop_ip`
/// is normally set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub network: Prefix,
    #[serde(default)]
    pub next_hop_interface: Option<String>,
    #[serde(default)]
    pub next_hop_ip: Option<Ip>,
    #[serde(default = "default_admin_cost")]
    pub administrative_cost: u32,
}

impl StaticRoute {
    pub fn is_null_routed(&self) -> bool {
        self.next_hop_interface.as_deref() == Some(NULL_INTERFACE_NAME)
    }
}

/// An aggregate route. When `summary_only` is set the aggregate suppresses
/// the more-specific routes it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedRoute {
    pub network: Prefix,
    #[serde(default)]
    pub summary_only: bool,
}
