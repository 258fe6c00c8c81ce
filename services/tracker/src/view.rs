//! services/tracker/src/view.rs
//!
//! Presentation components. Each function is a pure mapping from controller
//! state to a serialisable view model; the client only draws what it receives.

use crate::controller::{Phase, TicketForm, TrackerState};
use chrono::{DateTime, Utc};
use commission_guard_core::domain::{Session, Ticket, TicketId, TicketStatus, ViewFilter};
use commission_guard_core::stats::StatsSummary;
use serde::Serialize;
use uuid::Uuid;

//=========================================================================================
// View Models
//=========================================================================================

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTone {
    Warning,
    Info,
    Success,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusBadge {
    pub label: &'static str,
    pub tone: BadgeTone,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TicketRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub badge: StatusBadge,
    pub created: String,
    pub is_mine: bool,
    pub can_delete: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TicketListView {
    pub rows: Vec<TicketRow>,
    pub empty_message: Option<&'static str>,
    /// Statuses offered by every row's status control.
    pub status_options: [TicketStatus; 3],
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatCard {
    pub status: TicketStatus,
    pub badge: StatusBadge,
    pub count: usize,
    pub percent: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatsDashboardView {
    pub total: usize,
    pub cards: Vec<StatCard>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TicketFormView {
    pub title: String,
    pub description: String,
    pub can_submit: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDialogView {
    pub ticket_id: Uuid,
    pub message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackerBody {
    List(TicketListView),
    Stats(StatsDashboardView),
    /// The live query is open but has not delivered yet.
    Syncing,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Screen {
    Loading,
    Blocked {
        message: String,
    },
    Tracker {
        session_id: Uuid,
        anonymous: bool,
        view: ViewFilter,
        form: TicketFormView,
        body: TrackerBody,
        confirm: Option<ConfirmDialogView>,
    },
}

//=========================================================================================
// Components
//=========================================================================================

pub fn status_badge(status: TicketStatus) -> StatusBadge {
    let tone = match status {
        TicketStatus::Open => BadgeTone::Warning,
        TicketStatus::InProgress => BadgeTone::Info,
        TicketStatus::Resolved => BadgeTone::Success,
    };
    StatusBadge {
        label: status.as_str(),
        tone,
    }
}

fn created_label(created_at: Option<DateTime<Utc>>) -> String {
    match created_at {
        Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        None => "Pending".to_string(),
    }
}

pub fn ticket_list(tickets: &[Ticket], session: &Session, view: ViewFilter) -> TicketListView {
    let rows = tickets
        .iter()
        .map(|ticket| {
            let is_mine = ticket.is_owned_by(session);
            TicketRow {
                id: ticket.id,
                title: ticket.title.clone(),
                description: ticket.description.clone(),
                status: ticket.status,
                badge: status_badge(ticket.status),
                created: created_label(ticket.created_at),
                is_mine,
                can_delete: is_mine,
            }
        })
        .collect::<Vec<_>>();

    let empty_message = match (rows.is_empty(), view) {
        (false, _) => None,
        (true, ViewFilter::MyTickets) => Some("You have not filed any tickets yet."),
        (true, _) => Some("No tickets have been filed yet."),
    };

    TicketListView {
        rows,
        empty_message,
        status_options: TicketStatus::ALL,
    }
}

pub fn stats_dashboard(summary: &StatsSummary) -> StatsDashboardView {
    let cards = TicketStatus::ALL
        .into_iter()
        .map(|status| {
            let share = summary.share(status);
            StatCard {
                status,
                badge: status_badge(status),
                count: share.count,
                percent: share.percent,
            }
        })
        .collect();
    StatsDashboardView {
        total: summary.total,
        cards,
    }
}

pub fn ticket_form(form: &TicketForm) -> TicketFormView {
    TicketFormView {
        title: form.title.clone(),
        description: form.description.clone(),
        can_submit: !form.title.trim().is_empty() && !form.description.trim().is_empty(),
    }
}

pub fn confirm_dialog(pending: Option<TicketId>, tickets: &[Ticket]) -> Option<ConfirmDialogView> {
    let id = pending?;
    let ticket = tickets.iter().find(|t| t.id == id)?;
    Some(ConfirmDialogView {
        ticket_id: id,
        message: format!("Delete \"{}\"? This cannot be undone.", ticket.title),
    })
}

/// Renders the whole screen for one application instance.
pub fn render(state: &TrackerState) -> Screen {
    let session = match (&state.phase, &state.session) {
        (Phase::Blocked(message), _) => {
            return Screen::Blocked {
                message: message.clone(),
            }
        }
        (Phase::Loading, _) | (_, None) => return Screen::Loading,
        (_, Some(session)) => session,
    };

    let body = match (&state.phase, state.view) {
        (Phase::Subscribed, _) => TrackerBody::Syncing,
        (_, ViewFilter::Stats) => TrackerBody::Stats(stats_dashboard(&state.stats())),
        (_, view) => TrackerBody::List(ticket_list(&state.tickets, session, view)),
    };

    Screen::Tracker {
        session_id: session.id,
        anonymous: session.anonymous,
        view: state.view,
        form: ticket_form(&state.form),
        body,
        confirm: confirm_dialog(state.pending_delete, &state.tickets),
    }
}
