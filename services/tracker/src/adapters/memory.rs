//! services/tracker/src/adapters/memory.rs
//!
//! An in-process backend implementing both the `IdentityProvider` and the
//! `TicketStore` ports. Live queries are driven by a broadcast channel that
//! fires after every write. Used for local development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use commission_guard_core::domain::{Session, Ticket, TicketId, TicketQuery, TicketStatus};
use commission_guard_core::ports::{
    IdentityProvider, NewTicket, PortError, PortResult, SnapshotStream, TicketStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Capacity of the change-notification channel. Lagging watchers simply
/// re-read the collection, so overflow only coalesces notifications.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct MemoryInner {
    /// Insertion order is preserved; live queries never sort.
    tickets: Vec<Ticket>,
    tokens: HashMap<String, Uuid>,
    last_created_at: Option<DateTime<Utc>>,
}

/// A cloneable handle to the shared in-memory collection.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
    changes: broadcast::Sender<()>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            changes,
        }
    }

    /// Registers a sign-in token for a new identity and returns that identity's id.
    pub async fn register_token(&self, token: &str) -> Uuid {
        let identity_id = Uuid::new_v4();
        self.inner
            .lock()
            .await
            .tokens
            .insert(token.to_string(), identity_id);
        identity_id
    }

    /// Places an already-materialized document into the collection, e.g. an
    /// imported ticket whose timestamp never resolved.
    pub async fn seed(&self, ticket: Ticket) {
        self.inner.lock().await.tickets.push(ticket);
        self.notify();
    }

    fn notify(&self) {
        // No receivers simply means no live queries are open.
        let _ = self.changes.send(());
    }

    async fn snapshot(inner: &Mutex<MemoryInner>, query: &TicketQuery) -> Vec<Ticket> {
        inner
            .lock()
            .await
            .tickets
            .iter()
            .filter(|ticket| query.matches(ticket))
            .cloned()
            .collect()
    }
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in_anonymously(&self) -> PortResult<Session> {
        Ok(Session {
            id: Uuid::new_v4(),
            anonymous: true,
        })
    }

    async fn sign_in_with_token(&self, token: &str) -> PortResult<Session> {
        let inner = self.inner.lock().await;
        let id = inner.tokens.get(token).copied().ok_or(PortError::Unauthorized)?;
        Ok(Session {
            id,
            anonymous: false,
        })
    }

    async fn sign_out(&self, session: &Session) -> PortResult<()> {
        debug!("Identity {} signed out of the memory backend.", session.id);
        Ok(())
    }
}

//=========================================================================================
// `TicketStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TicketStore for MemoryBackend {
    async fn watch(&self, query: TicketQuery) -> PortResult<SnapshotStream> {
        // Subscribe before the first read so no write slips in between.
        let mut changes = self.changes.subscribe();
        let inner = self.inner.clone();

        let stream = async_stream::stream! {
            yield Ok::<_, PortError>(MemoryBackend::snapshot(&inner, &query).await);
            loop {
                match changes.recv().await {
                    Ok(()) => yield Ok(MemoryBackend::snapshot(&inner, &query).await),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Live query lagged behind {} changes; re-reading.", skipped);
                        yield Ok(MemoryBackend::snapshot(&inner, &query).await);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn insert(&self, ticket: NewTicket) -> PortResult<TicketId> {
        let id = Uuid::new_v4();
        {
            let mut inner = self.inner.lock().await;
            // Server timestamps are strictly increasing so creation order is total.
            let mut created_at = Utc::now();
            if let Some(last) = inner.last_created_at {
                if created_at <= last {
                    created_at = last + Duration::microseconds(1);
                }
            }
            inner.last_created_at = Some(created_at);
            inner.tickets.push(Ticket {
                id,
                title: ticket.title,
                description: ticket.description,
                status: ticket.status,
                owner_id: ticket.owner_id,
                created_at: Some(created_at),
            });
        }
        self.notify();
        Ok(id)
    }

    async fn update_status(&self, id: TicketId, status: TicketStatus) -> PortResult<()> {
        {
            let mut inner = self.inner.lock().await;
            let ticket = inner
                .tickets
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| PortError::NotFound(format!("Ticket {} not found", id)))?;
            ticket.status = status;
        }
        self.notify();
        Ok(())
    }

    async fn delete(&self, id: TicketId) -> PortResult<()> {
        {
            let mut inner = self.inner.lock().await;
            let before = inner.tickets.len();
            inner.tickets.retain(|t| t.id != id);
            if inner.tickets.len() == before {
                return Err(PortError::NotFound(format!("Ticket {} not found", id)));
            }
        }
        self.notify();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    fn new_ticket(title: &str, owner_id: Uuid) -> NewTicket {
        NewTicket {
            title: title.to_string(),
            description: "desc".to_string(),
            status: TicketStatus::Open,
            owner_id,
        }
    }

    async fn next_snapshot(stream: &mut SnapshotStream) -> Vec<Ticket> {
        timeout(StdDuration::from_secs(2), stream.next())
            .await
            .expect("snapshot should arrive")
            .expect("stream should stay open")
            .expect("snapshot should succeed")
    }

    #[tokio::test]
    async fn test_watch_emits_initial_and_changed_snapshots() {
        let backend = MemoryBackend::new();
        let owner = Uuid::new_v4();

        let mut stream = backend.watch(TicketQuery::All).await.unwrap();
        assert!(next_snapshot(&mut stream).await.is_empty());

        let id = backend.insert(new_ticket("first", owner)).await.unwrap();
        let snapshot = next_snapshot(&mut stream).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert!(snapshot[0].created_at.is_some());

        backend.update_status(id, TicketStatus::Resolved).await.unwrap();
        let snapshot = next_snapshot(&mut stream).await;
        assert_eq!(snapshot[0].status, TicketStatus::Resolved);

        backend.delete(id).await.unwrap();
        assert!(next_snapshot(&mut stream).await.is_empty());
    }

    #[tokio::test]
    async fn test_owned_watch_filters_by_owner() {
        let backend = MemoryBackend::new();
        let me = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        backend.insert(new_ticket("mine", me)).await.unwrap();
        backend.insert(new_ticket("theirs", someone_else)).await.unwrap();

        let mut stream = backend.watch(TicketQuery::Owned(me)).await.unwrap();
        let snapshot = next_snapshot(&mut stream).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].title, "mine");
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let backend = MemoryBackend::new();
        let owner = Uuid::new_v4();
        for i in 0..5 {
            backend.insert(new_ticket(&format!("t{}", i), owner)).await.unwrap();
        }
        let mut stream = backend.watch(TicketQuery::All).await.unwrap();
        let snapshot = next_snapshot(&mut stream).await;
        let stamps: Vec<_> = snapshot.iter().map(|t| t.created_at.unwrap()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_missing_ticket_mutations_are_not_found() {
        let backend = MemoryBackend::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            backend.update_status(missing, TicketStatus::Open).await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(backend.delete(missing).await, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_token_sign_in() {
        let backend = MemoryBackend::new();
        let id = backend.register_token("agent-token").await;

        let session = backend.sign_in_with_token("agent-token").await.unwrap();
        assert_eq!(session.id, id);
        assert!(!session.anonymous);

        assert!(matches!(
            backend.sign_in_with_token("bogus").await,
            Err(PortError::Unauthorized)
        ));

        let anon = backend.sign_in_anonymously().await.unwrap();
        assert!(anon.anonymous);
        assert_ne!(anon.id, id);
    }
}
