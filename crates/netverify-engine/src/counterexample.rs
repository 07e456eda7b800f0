use std::collections::BTreeMap;

use netverify_config::{Ip, Prefix, IP_PROTOCOL_ICMP, IP_PROTOCOL_TCP, IP_PROTOCOL_UDP};
use netverify_smt::solver::{Model, ModelValue};
use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;
use crate::encoder::Encoder;
use crate::graph::Graph;
use crate::protocol::OspfType;
use crate::result::Counterexample;
use crate::slice::EncoderSlice;
use crate::symbolic::{CommunityVar, SymbolicRecord};

fn int_val(model: &Model, t: &SmtTerm) -> Option<i64> {
    match model.eval(t) {
        Some(ModelValue::Int(n)) => Some(n),
        _ => None,
    }
}

pub(crate) fn is_true(model: &Model, t: &SmtTerm) -> bool {
    model.eval(t) == Some(ModelValue::Bool(true))
}

fn protocol_name(number: i64) -> String {
    match u8::try_from(number) {
        Ok(IP_PROTOCOL_ICMP) => "ICMP".to_string(),
        Ok(IP_PROTOCOL_TCP) => "TCP".to_string(),
        Ok(IP_PROTOCOL_UDP) => "UDP".to_string(),
        _ => number.to_string(),
    }
}

fn ip_of(value: i64) -> Option<Ip> {
    u32::try_from(value).ok().map(Ip)
}

/// Community regexes that name exactly one single-line community list
/// are shown under that list's name.
pub fn named_communities(graph: &Graph) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    for conf in graph.configurations().values() {
        for list in conf.community_lists.values() {
            if let [line] = list.lines.as_slice() {
                names.insert(line.regex.clone(), list.name.clone());
            }
        }
    }
    names
}

/// Decode the parts of `model` that belong to `enc` into `out`.
///
/// Two encoders sharing one context both decode into the same report.
pub fn build_counterexample(
    model: &Model,
    ctx: &EncodingContext,
    enc: &Encoder,
    out: &mut Counterexample,
) {
    if enc.query().full_model {
        for name in ctx.variables().keys() {
            if let Some(v) = model.values.get(name) {
                out.model.insert(name.clone(), v.to_string());
            }
        }
    }

    let main = enc.main_slice();
    let dst_ip = build_packet(model, main, &mut out.packet);

    // iBGP slices share the main slice's environment records.
    let names = named_communities(enc.graph());
    for (key, &id) in main.logical_graph().environment_records() {
        let record = main.record(id);
        if !is_true(model, &record.permitted) {
            continue;
        }
        let ge = main.graph().edge(key.edge);
        let label = format!("{},{} (BGP)", ge.router, ge.start.name);
        let attrs = environment_attributes(model, record, dst_ip, &names);
        out.environment.insert(label, attrs);
    }

    for (&id, df) in main.decisions().data_forwarding_map() {
        if is_true(model, df) {
            out.forwarding.insert(main.graph().edge(id).to_string());
        }
    }

    let failures = enc.failures();
    for ((a, b), var) in failures.internal_links() {
        if int_val(model, var) == Some(1) {
            out.failures.insert(format!("link({a},{b})"));
        }
    }
    for (&id, var) in failures.edge_links() {
        if int_val(model, var) == Some(1) {
            let ge = enc.graph().edge(id);
            out.failures
                .insert(format!("link({},{})", ge.router, ge.start.name));
        }
    }
    for (router, var) in failures.nodes() {
        if int_val(model, var) == Some(1) {
            out.failures.insert(format!("node({router})"));
        }
    }
}

/// A clause that forces the next model to drop at least one environment
/// announcement or community the current model sends, while keeping every
/// bit that is currently off switched off.
pub fn environment_blocking_clause(model: &Model, main: &EncoderSlice) -> SmtTerm {
    let mut enabled = Vec::new();
    let mut disabled = Vec::new();
    for &id in main.logical_graph().environment_records().values() {
        let record = main.record(id);
        let bits = std::iter::once(&record.permitted).chain(record.communities.values());
        for bit in bits {
            if is_true(model, bit) {
                enabled.push(bit.clone().not());
            } else {
                disabled.push(bit.clone().not());
            }
        }
    }
    SmtTerm::and(vec![SmtTerm::or(enabled), SmtTerm::and(disabled)])
}

/// Number of boolean environment bits the blocking clause can flip.
pub(crate) fn environment_bit_count(main: &EncoderSlice) -> usize {
    main.logical_graph()
        .environment_records()
        .values()
        .map(|&id| 1 + main.record(id).communities.len())
        .sum()
}

/// Packet fields of the main slice. Returns the destination address.
fn build_packet(model: &Model, slice: &EncoderSlice, packet: &mut BTreeMap<String, String>) -> Option<Ip> {
    let p = slice.packet();
    let dst = int_val(model, &p.dst_ip).and_then(ip_of);
    if let Some(ip) = dst {
        packet.insert("dstIp".into(), ip.to_string());
    }
    for (field, term) in p.int_fields().into_iter().skip(1) {
        let Some(value) = int_val(model, term).filter(|&v| v != 0) else {
            continue;
        };
        let shown = match field {
            "srcIp" => ip_of(value).map_or_else(|| value.to_string(), |ip| ip.to_string()),
            "ipProtocol" => protocol_name(value),
            _ => value.to_string(),
        };
        packet.insert(field.to_string(), shown);
    }
    for (field, term) in p.flag_fields() {
        if is_true(model, term) {
            packet.insert(field.to_string(), "set".into());
        }
    }
    dst
}

fn environment_attributes(
    model: &Model,
    r: &SymbolicRecord,
    dst_ip: Option<Ip>,
    names: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let len = int_val(model, &r.prefix_length).and_then(|l| u8::try_from(l).ok());
    if let (Some(ip), Some(len)) = (dst_ip, len) {
        if let Ok(prefix) = Prefix::new(ip, len) {
            attrs.insert("prefix".into(), prefix.to_string());
        }
    }
    let optional = [
        ("admin distance", r.admin_dist.as_ref()),
        ("local preference", r.local_pref.as_ref()),
        ("protocol metric", Some(&r.metric)),
        ("multi-exit disc.", r.med.as_ref()),
        ("OSPF Area", r.ospf_area.as_ref()),
    ];
    for (label, term) in optional {
        if let Some(v) = term.and_then(|t| int_val(model, t)) {
            attrs.insert(label.to_string(), v.to_string());
        }
    }
    let ospf_type = r
        .ospf_type
        .as_ref()
        .and_then(|t| int_val(model, t))
        .and_then(OspfType::from_code);
    if let Some(t) = ospf_type {
        attrs.insert("OSPF Type".into(), t.name().to_string());
    }
    for (cvar, term) in &r.communities {
        if matches!(cvar, CommunityVar::Other(_)) || !is_true(model, term) {
            continue;
        }
        let text = cvar.text();
        let shown = names.get(text).map_or(text, String::as_str);
        attrs.insert(format!("community {shown}"), String::new());
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_config::{CommunityList, CommunityListLine, Configuration, LineAction, Network};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn protocols_print_by_name_when_known() {
        assert_eq!(protocol_name(6), "TCP");
        assert_eq!(protocol_name(1), "ICMP");
        assert_eq!(protocol_name(89), "89");
        assert_eq!(protocol_name(300), "300");
    }

    #[test]
    fn only_single_line_lists_name_their_regex() -> TestResult {
        let mut conf = Configuration::new("r");
        let line = |regex: &str| CommunityListLine {
            action: LineAction::Permit,
            regex: regex.to_string(),
        };
        conf.community_lists.insert(
            "CUSTOMERS".into(),
            CommunityList {
                name: "CUSTOMERS".into(),
                lines: vec![line("65000:1")],
            },
        );
        conf.community_lists.insert(
            "MIXED".into(),
            CommunityList {
                name: "MIXED".into(),
                lines: vec![line("65000:2"), line("65000:3")],
            },
        );
        let graph = Graph::new(&Network::new(vec![conf])?)?;
        let names = named_communities(&graph);
        assert_eq!(names.get("65000:1").map(String::as_str), Some("CUSTOMERS"));
        assert!(!names.contains_key("65000:2"));
        Ok(())
    }

    #[test]
    fn zero_valued_packet_fields_are_omitted() -> TestResult {
        let mut a = Configuration::new("a");
        a.interfaces.push(
            netverify_config::Interface::new("eth0").with_address("10.0.0.1/24".parse()?),
        );
        let network = Network::new(vec![a])?;
        let graph = std::sync::Arc::new(Graph::new(&network)?);
        let query = std::sync::Arc::new(crate::query::QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let slice = EncoderSlice::new(
            &mut ctx,
            0,
            crate::slice::MAIN_SLICE_NAME,
            graph,
            query.clone(),
            query.header_space.clone(),
            None,
        )?;
        let mut model = Model::default();
        let p = slice.packet();
        for (_, t) in p.int_fields() {
            if let SmtTerm::Var(name) = t {
                model.values.insert(name.clone(), ModelValue::Int(0));
            }
        }
        for (_, t) in p.flag_fields() {
            if let SmtTerm::Var(name) = t {
                model.values.insert(name.clone(), ModelValue::Bool(false));
            }
        }
        if let SmtTerm::Var(name) = &p.dst_ip {
            model.values.insert(name.clone(), ModelValue::Int(0x0A00_0001));
        }
        if let SmtTerm::Var(name) = &p.ip_protocol {
            model.values.insert(name.clone(), ModelValue::Int(17));
        }
        if let SmtTerm::Var(name) = &p.tcp_syn {
            model.values.insert(name.clone(), ModelValue::Bool(true));
        }

        let mut packet = BTreeMap::new();
        let dst = build_packet(&model, &slice, &mut packet);
        assert_eq!(dst, Some(Ip(0x0A00_0001)));
        assert_eq!(packet.get("dstIp").map(String::as_str), Some("10.0.0.1"));
        assert_eq!(packet.get("ipProtocol").map(String::as_str), Some("UDP"));
        assert_eq!(packet.get("tcpSyn").map(String::as_str), Some("set"));
        assert!(!packet.contains_key("srcIp"));
        assert!(!packet.contains_key("dstPort"));
        Ok(())
    }
}
