use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;

/// Header fields of the packet a slice forwards. Addresses, ports and
/// small enumerations are bounded integers.
#[derive(Debug, Clone)]
pub struct SymbolicPacket {
    pub dst_ip: SmtTerm,
    pub src_ip: SmtTerm,
    pub dst_port: SmtTerm,
    pub src_port: SmtTerm,
    pub icmp_code: SmtTerm,
    pub icmp_type: SmtTerm,
    pub ip_protocol: SmtTerm,
    pub tcp_ack: SmtTerm,
    pub tcp_cwr: SmtTerm,
    pub tcp_ece: SmtTerm,
    pub tcp_fin: SmtTerm,
    pub tcp_psh: SmtTerm,
    pub tcp_rst: SmtTerm,
    pub tcp_syn: SmtTerm,
    pub tcp_urg: SmtTerm,
}

impl SymbolicPacket {
    pub fn new(ctx: &mut EncodingContext, encoder_id: usize, slice_name: &str) -> Self {
        let base = format!("{encoder_id}_{slice_name}");
        let mut int = |field: &str| ctx.declare_int(format!("{base}{field}"));
        let dst_ip = int("dst-ip");
        let src_ip = int("src-ip");
        let dst_port = int("dst-port");
        let src_port = int("src-port");
        let icmp_code = int("icmp-code");
        let icmp_type = int("icmp-type");
        let ip_protocol = int("ip-protocol");
        let mut flag = |field: &str| ctx.declare_bool(format!("{base}{field}"));
        SymbolicPacket {
            dst_ip,
            src_ip,
            dst_port,
            src_port,
            icmp_code,
            icmp_type,
            ip_protocol,
            tcp_ack: flag("tcp-ack"),
            tcp_cwr: flag("tcp-cwr"),
            tcp_ece: flag("tcp-ece"),
            tcp_fin: flag("tcp-fin"),
            tcp_psh: flag("tcp-psh"),
            tcp_rst: flag("tcp-rst"),
            tcp_syn: flag("tcp-syn"),
            tcp_urg: flag("tcp-urg"),
        }
    }

    /// Field-by-field equality with another packet.
    pub fn mk_equal(&self, other: &SymbolicPacket) -> SmtTerm {
        let pairs = [
            (&self.dst_ip, &other.dst_ip),
            (&self.src_ip, &other.src_ip),
            (&self.dst_port, &other.dst_port),
            (&self.src_port, &other.src_port),
            (&self.icmp_code, &other.icmp_code),
            (&self.icmp_type, &other.icmp_type),
            (&self.ip_protocol, &other.ip_protocol),
            (&self.tcp_ack, &other.tcp_ack),
            (&self.tcp_cwr, &other.tcp_cwr),
            (&self.tcp_ece, &other.tcp_ece),
            (&self.tcp_fin, &other.tcp_fin),
            (&self.tcp_psh, &other.tcp_psh),
            (&self.tcp_rst, &other.tcp_rst),
            (&self.tcp_syn, &other.tcp_syn),
            (&self.tcp_urg, &other.tcp_urg),
        ];
        SmtTerm::and(
            pairs
                .into_iter()
                .map(|(a, b)| a.clone().eq(b.clone()))
                .collect(),
        )
    }

    /// `(name suffix, term)` for every integer field, in report order.
    pub fn int_fields(&self) -> [(&'static str, &SmtTerm); 7] {
        [
            ("dstIp", &self.dst_ip),
            ("srcIp", &self.src_ip),
            ("dstPort", &self.dst_port),
            ("srcPort", &self.src_port),
            ("icmpCode", &self.icmp_code),
            ("icmpType", &self.icmp_type),
            ("ipProtocol", &self.ip_protocol),
        ]
    }

    pub fn flag_fields(&self) -> [(&'static str, &SmtTerm); 8] {
        [
            ("tcpAck", &self.tcp_ack),
            ("tcpCwr", &self.tcp_cwr),
            ("tcpEce", &self.tcp_ece),
            ("tcpFin", &self.tcp_fin),
            ("tcpPsh", &self.tcp_psh),
            ("tcpRst", &self.tcp_rst),
            ("tcpSyn", &self.tcp_syn),
            ("tcpUrg", &self.tcp_urg),
        ]
    }
}
