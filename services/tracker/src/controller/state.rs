//! services/tracker/src/controller/state.rs
//!
//! The view-model owned by one application instance and the commands that
//! mutate it.

use commission_guard_core::domain::{Session, Ticket, TicketId, TicketStatus, ViewFilter};
use commission_guard_core::stats::StatsSummary;

/// Initialization progress of one application instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the identity provider.
    Loading,
    /// A live query is open but has not delivered yet.
    Subscribed,
    /// At least one snapshot has been applied for the current query.
    Ready,
    /// No session could be established; nothing else can happen.
    Blocked(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketForm {
    pub title: String,
    pub description: String,
}

impl TicketForm {
    pub fn clear(&mut self) {
        self.title.clear();
        self.description.clear();
    }
}

/// User intents, as delivered by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetTitle(String),
    SetDescription(String),
    Submit,
    ChangeStatus { id: TicketId, status: TicketStatus },
    SwitchView(ViewFilter),
    RequestDelete(TicketId),
    ConfirmDelete,
    CancelDelete,
    SignOut,
}

#[derive(Debug, Clone)]
pub struct TrackerState {
    pub phase: Phase,
    pub session: Option<Session>,
    pub view: ViewFilter,
    /// The latest snapshot, newest first. Replaced wholesale, never patched.
    pub tickets: Vec<Ticket>,
    pub form: TicketForm,
    pub pending_delete: Option<TicketId>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            phase: Phase::Loading,
            session: None,
            view: ViewFilter::MyTickets,
            tickets: Vec::new(),
            form: TicketForm::default(),
            pending_delete: None,
        }
    }
}

impl TrackerState {
    pub fn stats(&self) -> StatsSummary {
        StatsSummary::from_tickets(&self.tickets)
    }

    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    /// Whether the current session may open the delete confirmation for `id`.
    pub fn can_delete(&self, id: TicketId) -> bool {
        match (&self.session, self.ticket(id)) {
            (Some(session), Some(ticket)) => ticket.is_owned_by(session),
            _ => false,
        }
    }
}
