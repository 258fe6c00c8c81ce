pub mod domain;
pub mod ports;
pub mod stats;

pub use domain::{
    sort_newest_first, DraftError, Session, Ticket, TicketDraft, TicketId, TicketQuery,
    TicketStatus, UnknownStatus, ViewFilter,
};
pub use ports::{IdentityProvider, NewTicket, PortError, PortResult, SnapshotStream, TicketStore};
pub use stats::{StatsSummary, StatusShare};
