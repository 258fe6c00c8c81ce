//! crates/commission_guard_core/src/domain.rs
//!
//! Defines the pure, core data structures for the ticket tracker.
//! These types are independent of any database or transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier assigned to a ticket by the document store.
pub type TicketId = Uuid;

/// An authenticated or anonymous identity bound to one application instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub anonymous: bool,
}

//=========================================================================================
// Tickets
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 3] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
    ];

    /// The label stored in documents and shown in badges.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown ticket status: '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A commission ticket as materialized from the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub owner_id: Uuid,
    /// Assigned by the store; `None` while the server timestamp is unresolved.
    pub created_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_owned_by(&self, session: &Session) -> bool {
        self.owner_id == session.id
    }
}

/// Validated user input for a new ticket. Both fields are trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    title: String,
    description: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("Description must not be empty")]
    EmptyDescription,
}

impl TicketDraft {
    pub fn new(title: &str, description: &str) -> Result<Self, DraftError> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(DraftError::EmptyTitle);
        }
        if description.is_empty() {
            return Err(DraftError::EmptyDescription);
        }
        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

//=========================================================================================
// Views and Queries
//=========================================================================================

/// The UI-selected scope. Process-local, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewFilter {
    #[default]
    #[serde(rename = "my")]
    MyTickets,
    #[serde(rename = "all")]
    AllTickets,
    #[serde(rename = "stats")]
    Stats,
}

impl ViewFilter {
    /// The live query backing this view for the given session.
    pub fn query_for(&self, session: &Session) -> TicketQuery {
        match self {
            ViewFilter::MyTickets => TicketQuery::Owned(session.id),
            ViewFilter::AllTickets | ViewFilter::Stats => TicketQuery::All,
        }
    }
}

/// A live query over the ticket collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketQuery {
    Owned(Uuid),
    All,
}

impl TicketQuery {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        match self {
            TicketQuery::Owned(owner_id) => ticket.owner_id == *owner_id,
            TicketQuery::All => true,
        }
    }

    pub fn owner(&self) -> Option<Uuid> {
        match self {
            TicketQuery::Owned(owner_id) => Some(*owner_id),
            TicketQuery::All => None,
        }
    }
}

/// Stable sort, newest first. Undated tickets compare as oldest.
pub fn sort_newest_first(tickets: &mut [Ticket]) {
    tickets.sort_by_key(|ticket| Reverse(ticket.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ticket(title: &str, created_at: Option<i64>) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "desc".to_string(),
            status: TicketStatus::Open,
            owner_id: Uuid::nil(),
            created_at: created_at.map(|secs| Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    #[test]
    fn test_draft_trims_fields() {
        let draft = TicketDraft::new("  Refund for order #457 ", "\tDouble-charged\n").unwrap();
        assert_eq!(draft.title(), "Refund for order #457");
        assert_eq!(draft.description(), "Double-charged");
    }

    #[test]
    fn test_draft_rejects_blank_fields() {
        assert_eq!(TicketDraft::new("", "x"), Err(DraftError::EmptyTitle));
        assert_eq!(TicketDraft::new("   ", "x"), Err(DraftError::EmptyTitle));
        assert_eq!(TicketDraft::new("x", " \n\t"), Err(DraftError::EmptyDescription));
    }

    #[test]
    fn test_status_round_trips_through_label() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert!("Closed".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_with_display_label() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        let view: ViewFilter = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(view, ViewFilter::AllTickets);
    }

    #[test]
    fn test_sort_newest_first_puts_undated_last() {
        let mut tickets = vec![
            ticket("undated", None),
            ticket("old", Some(100)),
            ticket("new", Some(300)),
            ticket("mid", Some(200)),
        ];
        sort_newest_first(&mut tickets);
        let titles: Vec<_> = tickets.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old", "undated"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let mut tickets = vec![
            ticket("first", Some(100)),
            ticket("second", Some(100)),
            ticket("a", None),
            ticket("b", None),
        ];
        sort_newest_first(&mut tickets);
        let titles: Vec<_> = tickets.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "a", "b"]);
    }

    #[test]
    fn test_view_query_mapping() {
        let session = Session {
            id: Uuid::new_v4(),
            anonymous: true,
        };
        assert_eq!(
            ViewFilter::MyTickets.query_for(&session),
            TicketQuery::Owned(session.id)
        );
        assert_eq!(ViewFilter::AllTickets.query_for(&session), TicketQuery::All);
        assert_eq!(ViewFilter::Stats.query_for(&session), TicketQuery::All);
    }

    #[test]
    fn test_owned_query_matches_only_owner() {
        let owner = Uuid::new_v4();
        let mut mine = ticket("mine", Some(1));
        mine.owner_id = owner;
        let theirs = ticket("theirs", Some(2));

        let query = TicketQuery::Owned(owner);
        assert!(query.matches(&mine));
        assert!(!query.matches(&theirs));
        assert!(TicketQuery::All.matches(&theirs));
    }
}
