//! Protocols and the small enumerations the encoding stores as integers.

use std::fmt;

use netverify_config::RoutingProtocol;
use serde::Serialize;

/// A routing protocol as seen by the encoding. `Best` stands for the
/// router-wide decision across every protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    Best,
    Bgp,
    Ospf,
    Static,
    Connected,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Best => "BEST",
            Protocol::Bgp => "BGP",
            Protocol::Ospf => "OSPF",
            Protocol::Static => "STATIC",
            Protocol::Connected => "CONNECTED",
        }
    }

    /// Integer tag stored in protocol-history variables.
    pub fn history_code(self) -> i64 {
        match self {
            Protocol::Connected => 0,
            Protocol::Static => 1,
            Protocol::Ospf => 2,
            Protocol::Bgp => 3,
            Protocol::Best => -1,
        }
    }

    pub fn from_history_code(code: i64) -> Option<Protocol> {
        match code {
            0 => Some(Protocol::Connected),
            1 => Some(Protocol::Static),
            2 => Some(Protocol::Ospf),
            3 => Some(Protocol::Bgp),
            _ => None,
        }
    }

    /// The protocol a policy `MatchProtocol` refers to. OSPF sub-types and
    /// iBGP fold into their parent protocol; protocols that are never
    /// modeled map to `None`.
    pub fn from_routing_protocol(rp: RoutingProtocol) -> Option<Protocol> {
        match rp {
            RoutingProtocol::Connected => Some(Protocol::Connected),
            RoutingProtocol::Static => Some(Protocol::Static),
            RoutingProtocol::Ospf
            | RoutingProtocol::OspfIa
            | RoutingProtocol::OspfE1
            | RoutingProtocol::OspfE2 => Some(Protocol::Ospf),
            RoutingProtocol::Bgp | RoutingProtocol::Ibgp => Some(Protocol::Bgp),
            RoutingProtocol::Aggregate | RoutingProtocol::Rip | RoutingProtocol::Isis => None,
        }
    }

    /// Administrative distance a route of this protocol carries when no
    /// policy changes it (external BGP for `Bgp`).
    pub fn default_admin_distance(self) -> i64 {
        match self {
            Protocol::Connected => 0,
            Protocol::Static => 1,
            Protocol::Ospf => 110,
            Protocol::Bgp => 20,
            Protocol::Best => 0,
        }
    }

    pub fn is_bgp(self) -> bool {
        self == Protocol::Bgp
    }

    pub fn is_ospf(self) -> bool {
        self == Protocol::Ospf
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Administrative distance of routes learned over iBGP.
pub const IBGP_ADMIN_DISTANCE: i64 = 200;

/// OSPF route types in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OspfType {
    O,
    OIA,
    E1,
    E2,
}

impl OspfType {
    pub const ALL: [OspfType; 4] = [OspfType::O, OspfType::OIA, OspfType::E1, OspfType::E2];

    pub fn code(self) -> i64 {
        match self {
            OspfType::O => 0,
            OspfType::OIA => 1,
            OspfType::E1 => 2,
            OspfType::E2 => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<OspfType> {
        OspfType::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            OspfType::O => "O",
            OspfType::OIA => "OIA",
            OspfType::E1 => "E1",
            OspfType::E2 => "E2",
        }
    }
}

/// Direction of a logical edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EdgeType {
    Import,
    Export,
}

impl EdgeType {
    pub fn name(self) -> &'static str {
        match self {
            EdgeType::Import => "IMPORT",
            EdgeType::Export => "EXPORT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_codes_round_trip() {
        for p in [
            Protocol::Connected,
            Protocol::Static,
            Protocol::Ospf,
            Protocol::Bgp,
        ] {
            assert_eq!(Protocol::from_history_code(p.history_code()), Some(p));
        }
        assert_eq!(Protocol::from_history_code(Protocol::Best.history_code()), None);
    }

    #[test]
    fn ospf_subtypes_fold_into_ospf() {
        assert_eq!(
            Protocol::from_routing_protocol(RoutingProtocol::OspfE2),
            Some(Protocol::Ospf)
        );
        assert_eq!(
            Protocol::from_routing_protocol(RoutingProtocol::Ibgp),
            Some(Protocol::Bgp)
        );
        assert_eq!(Protocol::from_routing_protocol(RoutingProtocol::Rip), None);
    }

    #[test]
    fn ospf_types_are_ordered_by_preference() {
        let codes: Vec<i64> = OspfType::ALL.iter().map(|t| t.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3]);
        assert_eq!(OspfType::from_code(3), Some(OspfType::E2));
    }
}
