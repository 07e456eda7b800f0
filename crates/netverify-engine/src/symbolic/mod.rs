//! The symbolic data model: route records, the packet, failure
//! indicators and per-router decisions.

pub mod community;
pub mod decisions;
pub mod failures;
pub mod packet;
pub mod record;

pub use community::{CommunityTable, CommunityVar};
pub use decisions::SymbolicDecisions;
pub use failures::SymbolicFailures;
pub use packet::SymbolicPacket;
pub use record::{RecordFactory, RecordId, RecordKind, SymbolicRecord};
