//! crates/commission_guard_core/src/stats.rs
//!
//! Aggregate statistics derived from the currently loaded ticket set.

use crate::domain::{Ticket, TicketStatus};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusShare {
    pub count: usize,
    /// Share of the total, rounded to one decimal. 0 when the total is 0.
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSummary {
    pub total: usize,
    pub open: StatusShare,
    pub in_progress: StatusShare,
    pub resolved: StatusShare,
}

impl StatsSummary {
    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        let total = tickets.len();
        let count = |status: TicketStatus| tickets.iter().filter(|t| t.status == status).count();
        let share = |status: TicketStatus| {
            let count = count(status);
            StatusShare {
                count,
                percent: percent_of(count, total),
            }
        };

        Self {
            total,
            open: share(TicketStatus::Open),
            in_progress: share(TicketStatus::InProgress),
            resolved: share(TicketStatus::Resolved),
        }
    }

    pub fn share(&self, status: TicketStatus) -> StatusShare {
        match status {
            TicketStatus::Open => self.open,
            TicketStatus::InProgress => self.in_progress,
            TicketStatus::Resolved => self.resolved,
        }
    }
}

fn percent_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}
