//! services/tracker/src/repository.rs
//!
//! The ticket repository client. Wraps the `TicketStore` port with the
//! application's rules: drafts are validated before insert, snapshots are
//! sorted newest-first, and every operation logs its failure instead of
//! returning it.

use commission_guard_core::domain::{
    sort_newest_first, Session, Ticket, TicketDraft, TicketId, TicketQuery, TicketStatus,
};
use commission_guard_core::ports::{NewTicket, PortResult, TicketStore};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One snapshot pushed by a live query, tagged with the query's generation.
#[derive(Debug)]
pub struct Delivery {
    pub generation: u64,
    pub result: PortResult<Vec<Ticket>>,
}

/// A running live query. Dropping it tears the subscription down.
pub struct LiveQuery {
    generation: u64,
    query: TicketQuery,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl LiveQuery {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> TicketQuery {
        self.query
    }

    /// Stops the forwarding task. Nothing from this query is sent after this returns
    /// except a delivery that was already queued, which carries the old generation.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        debug!("Tearing down live query generation {}.", self.generation);
        self.token.cancel();
        self.handle.abort();
    }
}

#[derive(Clone)]
pub struct TicketRepository {
    store: Arc<dyn TicketStore>,
}

impl TicketRepository {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Opens a live query whose snapshots are sorted and forwarded to `sink`.
    pub fn subscribe(
        &self,
        query: TicketQuery,
        generation: u64,
        sink: mpsc::UnboundedSender<Delivery>,
    ) -> LiveQuery {
        let token = CancellationToken::new();
        let store = self.store.clone();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let opened = tokio::select! {
                _ = task_token.cancelled() => return,
                opened = store.watch(query) => opened,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to open live query {:?}: {}", query, e);
                    let _ = sink.send(Delivery { generation, result: Err(e) });
                    return;
                }
            };
            info!("Live query generation {} open for {:?}.", generation, query);

            loop {
                let next = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    next = stream.next() => next,
                };
                let result = match next {
                    Some(Ok(mut tickets)) => {
                        sort_newest_first(&mut tickets);
                        Ok(tickets)
                    }
                    Some(Err(e)) => {
                        warn!("Live query generation {} reported an error: {}", generation, e);
                        Err(e)
                    }
                    None => {
                        info!("Live query generation {} ended.", generation);
                        break;
                    }
                };
                if sink.send(Delivery { generation, result }).is_err() {
                    break;
                }
            }
        });

        LiveQuery {
            generation,
            query,
            token,
            handle,
        }
    }

    /// Inserts a new `Open` ticket owned by `session`.
    ///
    /// Returns `None` without touching the store when there is no session or
    /// the title or description is blank after trimming.
    pub async fn create(
        &self,
        session: Option<&Session>,
        title: &str,
        description: &str,
    ) -> Option<TicketId> {
        let Some(session) = session else {
            warn!("Ticket creation rejected: no active session.");
            return None;
        };
        let draft = match TicketDraft::new(title, description) {
            Ok(draft) => draft,
            Err(e) => {
                warn!("Ticket creation rejected: {}", e);
                return None;
            }
        };

        let ticket = NewTicket {
            title: draft.title().to_string(),
            description: draft.description().to_string(),
            status: TicketStatus::Open,
            owner_id: session.id,
        };
        match self.store.insert(ticket).await {
            Ok(id) => {
                info!("Created ticket {} for identity {}.", id, session.id);
                Some(id)
            }
            Err(e) => {
                error!("Failed to create ticket: {}", e);
                None
            }
        }
    }

    /// Any session may change any ticket's status.
    pub async fn update_status(&self, id: TicketId, status: TicketStatus) {
        match self.store.update_status(id, status).await {
            Ok(()) => info!("Ticket {} moved to {}.", id, status),
            Err(e) => error!("Failed to update status of ticket {}: {}", id, e),
        }
    }

    pub async fn delete(&self, id: TicketId) {
        match self.store.delete(id).await {
            Ok(()) => info!("Deleted ticket {}.", id),
            Err(e) => error!("Failed to delete ticket {}: {}", id, e),
        }
    }
}
