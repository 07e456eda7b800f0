//! Packet filters as formulas over the symbolic packet.

use netverify_config::{HeaderSpace, IpAccessList, LineAction, Prefix, SubRange, TcpFlags};
use netverify_smt::terms::SmtTerm;

use crate::error::{EncodeError, EncodeResult};
use crate::symbolic::SymbolicPacket;

fn in_prefix(x: &SmtTerm, p: &Prefix) -> SmtTerm {
    if p.length() == 0 {
        return SmtTerm::tt();
    }
    x.clone().in_range(p.start(), p.end_exclusive())
}

fn in_sub_range(x: &SmtTerm, r: &SubRange) -> SmtTerm {
    x.clone().in_range(r.start, r.end + 1)
}

/// Membership in any element of a positive list; an empty list matches
/// everything.
fn any_of<T>(items: &[T], f: impl Fn(&T) -> SmtTerm) -> SmtTerm {
    if items.is_empty() {
        SmtTerm::tt()
    } else {
        SmtTerm::or(items.iter().map(f).collect())
    }
}

/// Membership in none of the elements of a negated list.
fn none_of<T>(items: &[T], f: impl Fn(&T) -> SmtTerm) -> SmtTerm {
    if items.is_empty() {
        SmtTerm::tt()
    } else {
        SmtTerm::or(items.iter().map(f).collect()).not()
    }
}

fn flags_term(flags: &TcpFlags, packet: &SymbolicPacket) -> SmtTerm {
    let wanted = [
        (flags.ack, &packet.tcp_ack),
        (flags.cwr, &packet.tcp_cwr),
        (flags.ece, &packet.tcp_ece),
        (flags.fin, &packet.tcp_fin),
        (flags.psh, &packet.tcp_psh),
        (flags.rst, &packet.tcp_rst),
        (flags.syn, &packet.tcp_syn),
        (flags.urg, &packet.tcp_urg),
    ];
    SmtTerm::and(
        wanted
            .into_iter()
            .filter_map(|(value, var)| {
                value.map(|v| if v { var.clone() } else { var.clone().not() })
            })
            .collect(),
    )
}

/// Name of the first field the encoding cannot express, if any.
fn unsupported_field(hs: &HeaderSpace) -> Option<&'static str> {
    if !hs.dscps.is_empty() || !hs.not_dscps.is_empty() {
        Some("dscp")
    } else if !hs.ecns.is_empty() || !hs.not_ecns.is_empty() {
        Some("ecn")
    } else if !hs.fragment_offsets.is_empty() || !hs.not_fragment_offsets.is_empty() {
        Some("fragment offset")
    } else if !hs.states.is_empty() {
        Some("connection state")
    } else {
        None
    }
}

fn negated_field(hs: &HeaderSpace) -> Option<&'static str> {
    if !hs.not_dst_ips.is_empty() {
        Some("negated destination ip")
    } else if !hs.not_src_ips.is_empty() {
        Some("negated source ip")
    } else if !hs.not_dst_ports.is_empty() {
        Some("negated destination port")
    } else if !hs.not_src_ports.is_empty() {
        Some("negated source port")
    } else if !hs.not_icmp_types.is_empty() {
        Some("negated icmp type")
    } else if !hs.not_icmp_codes.is_empty() {
        Some("negated icmp code")
    } else if !hs.not_ip_protocols.is_empty() {
        Some("negated ip protocol")
    } else if hs.negate {
        Some("negated match")
    } else {
        None
    }
}

fn match_term(hs: &HeaderSpace, packet: &SymbolicPacket) -> SmtTerm {
    let dst = &packet.dst_ip;
    let src = &packet.src_ip;
    let dport = &packet.dst_port;
    let sport = &packet.src_port;

    let src_or_dst_ips = any_of(&hs.src_or_dst_ips, |p| {
        SmtTerm::or(vec![in_prefix(dst, p), in_prefix(src, p)])
    });
    let src_or_dst_ports = any_of(&hs.src_or_dst_ports, |r| {
        SmtTerm::or(vec![in_sub_range(dport, r), in_sub_range(sport, r)])
    });

    let term = SmtTerm::and(vec![
        any_of(&hs.dst_ips, |p| in_prefix(dst, p)),
        none_of(&hs.not_dst_ips, |p| in_prefix(dst, p)),
        any_of(&hs.src_ips, |p| in_prefix(src, p)),
        none_of(&hs.not_src_ips, |p| in_prefix(src, p)),
        src_or_dst_ips,
        any_of(&hs.dst_ports, |r| in_sub_range(dport, r)),
        none_of(&hs.not_dst_ports, |r| in_sub_range(dport, r)),
        any_of(&hs.src_ports, |r| in_sub_range(sport, r)),
        none_of(&hs.not_src_ports, |r| in_sub_range(sport, r)),
        src_or_dst_ports,
        any_of(&hs.icmp_types, |r| in_sub_range(&packet.icmp_type, r)),
        none_of(&hs.not_icmp_types, |r| in_sub_range(&packet.icmp_type, r)),
        any_of(&hs.icmp_codes, |r| in_sub_range(&packet.icmp_code, r)),
        none_of(&hs.not_icmp_codes, |r| in_sub_range(&packet.icmp_code, r)),
        any_of(&hs.ip_protocols, |&p| {
            packet.ip_protocol.clone().eq(SmtTerm::int(i64::from(p)))
        }),
        none_of(&hs.not_ip_protocols, |&p| {
            packet.ip_protocol.clone().eq(SmtTerm::int(i64::from(p)))
        }),
        any_of(&hs.tcp_flags, |f| flags_term(f, packet)),
    ]);
    if hs.negate {
        term.not()
    } else {
        term
    }
}

/// The packets of a query header space. Negated fields are allowed here.
pub(crate) fn header_space_term(hs: &HeaderSpace, packet: &SymbolicPacket) -> EncodeResult<SmtTerm> {
    if let Some(field) = unsupported_field(hs) {
        return Err(EncodeError::unsupported("*", "*", "query", field));
    }
    Ok(match_term(hs, packet))
}

/// Packets permitted by `acl`: lines are tried in order and the first
/// match decides; a packet no line matches is denied.
pub(crate) fn acl_term(
    acl: &IpAccessList,
    packet: &SymbolicPacket,
    router: &str,
    iface: &str,
    direction: &str,
) -> EncodeResult<SmtTerm> {
    let mut acc = SmtTerm::ff();
    for line in acl.lines.iter().rev() {
        let hs = &line.matches;
        if let Some(field) = unsupported_field(hs).or_else(|| negated_field(hs)) {
            return Err(EncodeError::unsupported(
                router,
                iface,
                direction,
                format!("{field} in access list {}", acl.name),
            ));
        }
        let permit = SmtTerm::bool(line.action == LineAction::Permit);
        acc = SmtTerm::ite(match_term(hs, packet), permit, acc);
    }
    Ok(acc)
}
