//! crates/commission_guard_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the tracker's core logic.
//! The identity provider and the document store sit behind these traits so the
//! application never depends on a concrete backend.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{Session, Ticket, TicketId, TicketQuery, TicketStatus};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A live result set. The first item is the current snapshot; every later item
/// is the fully-materialized result after a change.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = PortResult<Vec<Ticket>>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> PortResult<Session>;

    /// Signs in with a pre-issued token. Unknown tokens yield `Unauthorized`.
    async fn sign_in_with_token(&self, token: &str) -> PortResult<Session>;

    async fn sign_out(&self, session: &Session) -> PortResult<()>;
}

/// The document shape written on insert. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub owner_id: Uuid,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Opens a live query. Dropping the stream closes it.
    async fn watch(&self, query: TicketQuery) -> PortResult<SnapshotStream>;

    async fn insert(&self, ticket: NewTicket) -> PortResult<TicketId>;

    async fn update_status(&self, id: TicketId, status: TicketStatus) -> PortResult<()>;

    async fn delete(&self, id: TicketId) -> PortResult<()>;
}
