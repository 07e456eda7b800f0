//! IP access lists and packet header spaces.

use serde::{Deserialize, Serialize};

use crate::ip::{Prefix, SubRange};
use crate::policy::LineAction;

pub const IP_PROTOCOL_ICMP: u8 = 1;
pub const IP_PROTOCOL_TCP: u8 = 6;
pub const IP_PROTOCOL_UDP: u8 = 17;

/// A set of TCP flag requirements. `None` leaves a flag unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TcpFlags {
    #[serde(default)]
    pub ack: Option<bool>,
    #[serde(default)]
    pub cwr: Option<bool>,
    #[serde(default)]
    pub ece: Option<bool>,
    #[serde(default)]
    pub fin: Option<bool>,
    #[serde(default)]
    pub psh: Option<bool>,
    #[serde(default)]
    pub rst: Option<bool>,
    #[serde(default)]
    pub syn: Option<bool>,
    #[serde(default)]
    pub urg: Option<bool>,
}

/// A set of packet headers described by positive and negated field
/// constraints. Empty lists leave a field unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSpace {
    pub dst_ips: Vec<Prefix>,
    pub not_dst_ips: Vec<Prefix>,
    pub src_ips: Vec<Prefix>,
    pub not_src_ips: Vec<Prefix>,
    pub src_or_dst_ips: Vec<Prefix>,
    pub dst_ports: Vec<SubRange>,
    pub not_dst_ports: Vec<SubRange>,
    pub src_ports: Vec<SubRange>,
    pub not_src_ports: Vec<SubRange>,
    pub src_or_dst_ports: Vec<SubRange>,
    pub icmp_types: Vec<SubRange>,
    pub not_icmp_types: Vec<SubRange>,
    pub icmp_codes: Vec<SubRange>,
    pub not_icmp_codes: Vec<SubRange>,
    pub ip_protocols: Vec<u8>,
    pub not_ip_protocols: Vec<u8>,
    pub tcp_flags: Vec<TcpFlags>,
    pub dscps: Vec<u8>,
    pub not_dscps: Vec<u8>,
    pub ecns: Vec<u8>,
    pub not_ecns: Vec<u8>,
    pub fragment_offsets: Vec<SubRange>,
    pub not_fragment_offsets: Vec<SubRange>,
    pub states: Vec<String>,
    /// Match the complement of everything above.
    pub negate: bool,
}

impl HeaderSpace {
    /// Header space of BGP session traffic towards `dst`.
    pub fn bgp_session_to(dst: Vec<Prefix>) -> Self {
        HeaderSpace {
            dst_ips: dst,
            dst_ports: vec![SubRange::single(179)],
            ip_protocols: vec![IP_PROTOCOL_TCP],
            ..HeaderSpace::default()
        }
    }

    /// True when no field carries a constraint.
    pub fn is_unconstrained(&self) -> bool {
        let positive_and_negative_empty = self.dst_ips.is_empty()
            && self.not_dst_ips.is_empty()
            && self.src_ips.is_empty()
            && self.not_src_ips.is_empty()
            && self.src_or_dst_ips.is_empty()
            && self.dst_ports.is_empty()
            && self.not_dst_ports.is_empty()
            && self.src_ports.is_empty()
            && self.not_src_ports.is_empty()
            && self.src_or_dst_ports.is_empty()
            && self.icmp_types.is_empty()
            && self.not_icmp_types.is_empty()
            && self.icmp_codes.is_empty()
            && self.not_icmp_codes.is_empty()
            && self.ip_protocols.is_empty()
            && self.not_ip_protocols.is_empty()
            && self.tcp_flags.is_empty();
        let unsupported_empty = self.dscps.is_empty()
            && self.not_dscps.is_empty()
            && self.ecns.is_empty()
            && self.not_ecns.is_empty()
            && self.fragment_offsets.is_empty()
            && self.not_fragment_offsets.is_empty()
            && self.states.is_empty();
        positive_and_negative_empty && unsupported_empty
    }
}

/// One ACL line: an action taken when the packet falls in `matches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAccessListLine {
    pub action: LineAction,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "match")]
    pub matches: HeaderSpace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAccessList {
    pub name: String,
    #[serde(default)]
    pub lines: Vec<IpAccessListLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn default_header_space_is_unconstrained() {
        assert!(HeaderSpace::default().is_unconstrained());
        let hs = HeaderSpace {
            states: vec!["established".into()],
            ..HeaderSpace::default()
        };
        assert!(!hs.is_unconstrained());
    }

    #[test]
    fn acl_line_json_uses_match_key() -> TestResult {
        let acl: IpAccessList = serde_json::from_str(
            r#"{"name": "BLOCK", "lines": [
                {"action": "deny", "match": {"dst_ips": ["10.0.0.0/8"], "ip_protocols": [6]}},
                {"action": "permit"}
            ]}"#,
        )?;
        assert_eq!(acl.lines.len(), 2);
        assert_eq!(acl.lines[0].matches.ip_protocols, vec![IP_PROTOCOL_TCP]);
        assert!(acl.lines[1].matches.is_unconstrained());
        Ok(())
    }
}
