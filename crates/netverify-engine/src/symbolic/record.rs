//! Symbolic route records: one named tuple of solver terms per logical
//! edge, best-route slot or environment input.

use std::collections::{BTreeMap, BTreeSet};

use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;
use crate::graph::Graph;
use crate::optimizations::Optimizations;
use crate::protocol::{OspfType, Protocol};
use crate::symbolic::community::CommunityVar;

/// Index of a record in its slice's record arena.
pub type RecordId = usize;

/// What slot a record fills. The kind decides which fields are present
/// and how the record name is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Import,
    Export,
    SingleExport,
    Best,
    BestOverall,
    Redistributed,
    Environment,
}

impl RecordKind {
    pub fn is_best(self) -> bool {
        matches!(self, RecordKind::Best | RecordKind::BestOverall)
    }

    pub fn is_export(self) -> bool {
        matches!(
            self,
            RecordKind::Export | RecordKind::SingleExport | RecordKind::Environment
        )
    }
}

/// A symbolic route announcement.
///
/// `permitted`, `prefix_length` and `metric` are always present. Every
/// other field is omitted when the optimization advisor proves it cannot
/// influence the outcome; readers substitute the protocol default.
#[derive(Debug, Clone)]
pub struct SymbolicRecord {
    pub name: String,
    pub router: String,
    pub proto: Protocol,
    pub kind: RecordKind,
    pub is_used: bool,
    pub permitted: SmtTerm,
    pub prefix_length: SmtTerm,
    pub metric: SmtTerm,
    pub admin_dist: Option<SmtTerm>,
    pub med: Option<SmtTerm>,
    pub local_pref: Option<SmtTerm>,
    pub ospf_area: Option<SmtTerm>,
    pub ospf_type: Option<SmtTerm>,
    pub router_id: Option<SmtTerm>,
    pub bgp_internal: Option<SmtTerm>,
    pub igp_metric: Option<SmtTerm>,
    pub client_id: Option<SmtTerm>,
    pub history: Option<SmtTerm>,
    /// Value `history` takes when the record is not permitted.
    pub history_default: i64,
    pub communities: BTreeMap<CommunityVar, SmtTerm>,
}

impl SymbolicRecord {
    /// Placeholder for an import record replaced by the peer's export
    /// record. It declares nothing.
    pub fn unused(name: String, router: &str, proto: Protocol) -> Self {
        SymbolicRecord {
            name,
            router: router.to_string(),
            proto,
            kind: RecordKind::Import,
            is_used: false,
            permitted: SmtTerm::ff(),
            prefix_length: SmtTerm::int(0),
            metric: SmtTerm::int(0),
            admin_dist: None,
            med: None,
            local_pref: None,
            ospf_area: None,
            ospf_type: None,
            router_id: None,
            bgp_internal: None,
            igp_metric: None,
            client_id: None,
            history: None,
            history_default: 0,
            communities: BTreeMap::new(),
        }
    }

    pub fn is_env(&self) -> bool {
        self.kind == RecordKind::Environment
    }

    pub fn is_best(&self) -> bool {
        self.kind.is_best()
    }

    pub fn is_best_overall(&self) -> bool {
        self.kind == RecordKind::BestOverall
    }

    pub fn is_export(&self) -> bool {
        self.kind.is_export()
    }

    /// `history == proto`, or a constant when the record carries no
    /// history and is itself a `proto` record.
    pub fn history_is(&self, proto: Protocol) -> SmtTerm {
        match &self.history {
            Some(h) => h.clone().eq(SmtTerm::int(proto.history_code())),
            None => SmtTerm::bool(self.proto == proto),
        }
    }

    /// `ospf_type == t`, or false when the record carries no type.
    pub fn ospf_type_is(&self, t: OspfType) -> SmtTerm {
        match &self.ospf_type {
            Some(v) => v.clone().eq(SmtTerm::int(t.code())),
            None => SmtTerm::ff(),
        }
    }
}

/// Builds records for one slice of one encoder, declaring their
/// variables and asserting their finite domains.
pub struct RecordFactory<'a> {
    pub encoder_id: usize,
    pub slice_name: &'a str,
    pub graph: &'a Graph,
    pub optimizations: &'a Optimizations,
}

impl<'a> RecordFactory<'a> {
    /// `<id>_<slice><router>_<PROTO>_<kind>_<iface>`.
    pub fn record_name(&self, router: &str, proto: Protocol, kind: RecordKind, iface: &str) -> String {
        let id = self.encoder_id;
        let slice = self.slice_name;
        match kind {
            RecordKind::BestOverall => format!("{id}_{slice}{router}_OVERALL_BEST_None"),
            RecordKind::Best => format!("{id}_{slice}{router}_{}_BEST_None", proto.name()),
            RecordKind::SingleExport => {
                format!("{id}_{slice}{router}_{}_SINGLE-EXPORT_", proto.name())
            }
            RecordKind::Redistributed => {
                format!("{id}_{slice}{router}_{}_Redistributed", proto.name())
            }
            RecordKind::Export => format!("{id}_{slice}{router}_{}_EXPORT_{iface}", proto.name()),
            RecordKind::Import => format!("{id}_{slice}{router}_{}_IMPORT_{iface}", proto.name()),
            RecordKind::Environment => {
                format!("{id}_{slice}{router}_{}_EXPORT_ENV-{iface}", proto.name())
            }
        }
    }

    pub fn create(
        &self,
        ctx: &mut EncodingContext,
        router: &str,
        proto: Protocol,
        kind: RecordKind,
        iface: &str,
    ) -> SymbolicRecord {
        let name = self.record_name(router, proto, kind, iface);
        let opts = self.optimizations;
        let protos = opts.protocols(router);
        let has = |p: Protocol| protos.contains(&p);
        let overall = kind == RecordKind::BestOverall;
        let bgp_fields = proto.is_bgp() || (overall && has(Protocol::Bgp));
        let ospf_fields = proto.is_ospf() || (overall && has(Protocol::Ospf));
        let multiple = protos.len() > 1;

        let permitted = ctx.declare_bool(format!("{name}_permitted"));
        let prefix_length = ctx.declare_int(format!("{name}_prefixLength"));
        let metric = ctx.declare_int(format!("{name}_metric"));

        let admin_dist = (opts.keep_admin_dist() || (overall && multiple))
            .then(|| ctx.declare_int(format!("{name}_adminDist")));
        let med = (opts.keep_med() && bgp_fields).then(|| ctx.declare_int(format!("{name}_med")));
        let local_pref = (opts.keep_local_pref() && bgp_fields)
            .then(|| ctx.declare_int(format!("{name}_localPref")));

        let keep_ospf = ospf_fields && opts.keep_ospf_type();
        let ospf_area = keep_ospf.then(|| ctx.declare_int(format!("{name}_ospfArea")));
        let ospf_type = keep_ospf.then(|| ctx.declare_int(format!("{name}_ospfType")));

        let need_internal = bgp_fields && opts.need_bgp_internal(router);
        let router_id = (bgp_fields && opts.need_router_id(router))
            .then(|| ctx.declare_int(format!("{name}_routerID")));
        let bgp_internal = need_internal.then(|| ctx.declare_bool(format!("{name}_bgpInternal")));
        let igp_metric = (need_internal && self.model_igp())
            .then(|| ctx.declare_int(format!("{name}_igpMetric")));
        let client_id = (bgp_fields && opts.need_originator_ids())
            .then(|| ctx.declare_int(format!("{name}_clientId")));

        let with_history = overall || kind == RecordKind::Redistributed;
        let history = with_history.then(|| ctx.declare_int(format!("{name}_history")));
        let history_default = protos.first().map_or(0, |p| p.history_code());

        let mut communities = BTreeMap::new();
        if bgp_fields {
            for c in self.graph.communities().all() {
                let var = ctx.declare_bool(format!("{name}_{}", c.name_suffix()));
                communities.insert(c.clone(), var);
            }
        }

        let record = SymbolicRecord {
            name,
            router: router.to_string(),
            proto,
            kind,
            is_used: true,
            permitted,
            prefix_length,
            metric,
            admin_dist,
            med,
            local_pref,
            ospf_area,
            ospf_type,
            router_id,
            bgp_internal,
            igp_metric,
            client_id,
            history,
            history_default,
            communities,
        };
        self.add_domains(ctx, &record, protos);
        record
    }

    fn model_igp(&self) -> bool {
        self.optimizations.model_igp()
    }

    fn add_domains(&self, ctx: &mut EncodingContext, record: &SymbolicRecord, protos: &[Protocol]) {
        if let Some(h) = &record.history {
            // Routers with no protocol in this slice still get a best record.
            let codes: BTreeSet<i64> = protos
                .iter()
                .map(|p| p.history_code())
                .chain(std::iter::once(record.history_default))
                .collect();
            let choices = codes
                .into_iter()
                .map(|code| h.clone().eq(SmtTerm::int(code)))
                .collect();
            ctx.add(SmtTerm::or(choices));
        }
        if let Some(t) = &record.ospf_type {
            ctx.add(t.clone().in_range(0, 4));
        }
        if let Some(a) = &record.ospf_area {
            let mut areas = self.graph.all_area_ids();
            areas.insert(0);
            let choices = areas
                .into_iter()
                .map(|id| a.clone().eq(SmtTerm::int(id as i64)))
                .collect();
            ctx.add(SmtTerm::or(choices));
        }
        if let Some(c) = &record.client_id {
            ctx.add(c.clone().in_range(0, self.graph.max_originator_id() + 1));
        }
    }
}
