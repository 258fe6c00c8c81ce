//! services/tracker/src/adapters/db.rs
//!
//! This module contains the PostgreSQL adapters: `PgIdentityAdapter` implements
//! the `IdentityProvider` port and `PgTicketStore` implements the `TicketStore`
//! port. Live queries are driven by the `ticket_changes` NOTIFY channel that the
//! migrations install on the `tickets` table, received once per store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use commission_guard_core::domain::{Session, Ticket, TicketId, TicketQuery, TicketStatus};
use commission_guard_core::ports::{
    IdentityProvider, NewTicket, PortError, PortResult, SnapshotStream, TicketStore,
};
use sqlx::postgres::PgListener;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Channel the `tickets` trigger notifies on; the payload is the row's `app_id`.
const TICKET_CHANGES_CHANNEL: &str = "ticket_changes";

/// Runs the embedded migrations at startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct IdentityRecord {
    id: Uuid,
    anonymous: bool,
}
impl IdentityRecord {
    fn to_domain(self) -> Session {
        Session {
            id: self.id,
            anonymous: self.anonymous,
        }
    }
}

#[derive(FromRow)]
struct TicketRecord {
    id: Uuid,
    title: String,
    description: String,
    status: String,
    owner_id: Uuid,
    created_at: Option<DateTime<Utc>>,
}
impl TicketRecord {
    fn to_domain(self) -> PortResult<Ticket> {
        let status = self
            .status
            .parse::<TicketStatus>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Ticket {
            id: self.id,
            title: self.title,
            description: self.description,
            status,
            owner_id: self.owner_id,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// Identity Adapter
//=========================================================================================

/// An identity adapter that implements the `IdentityProvider` port.
#[derive(Clone)]
pub struct PgIdentityAdapter {
    pool: PgPool,
}

impl PgIdentityAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityAdapter {
    async fn sign_in_anonymously(&self) -> PortResult<Session> {
        let record = sqlx::query_as::<_, IdentityRecord>(
            "INSERT INTO identities (id, anonymous) VALUES ($1, TRUE) RETURNING id, anonymous",
        )
        .bind(Uuid::new_v4())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn sign_in_with_token(&self, token: &str) -> PortResult<Session> {
        let record = sqlx::query_as::<_, IdentityRecord>(
            "SELECT i.id, i.anonymous FROM identity_tokens t \
             JOIN identities i ON i.id = t.identity_id \
             WHERE t.token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => unexpected(e),
        })?;

        sqlx::query("UPDATE identities SET signed_out_at = NULL WHERE id = $1")
            .bind(record.id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn sign_out(&self, session: &Session) -> PortResult<()> {
        sqlx::query("UPDATE identities SET signed_out_at = now() WHERE id = $1")
            .bind(session.id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// Ticket Store Adapter
//=========================================================================================

/// Capacity of the change fan-out channel. Lagging watchers re-read, so
/// overflow only coalesces notifications.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Delay before the shared listener retries after a failed reconnect.
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A document-store adapter over the `tickets` table, scoped to one app id.
///
/// One `PgListener` per store receives every `ticket_changes` notification and
/// fans the ones for this app out over a broadcast channel. Live queries only
/// borrow a pooled connection while they re-read.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
    app_id: String,
    changes: broadcast::Sender<()>,
    _listener: Arc<DropGuard>,
}

impl PgTicketStore {
    /// Starts the shared change listener and returns the store.
    pub async fn connect(pool: PgPool, app_id: String) -> PortResult<Self> {
        let mut listener = PgListener::connect_with(&pool)
            .await
            .map_err(unexpected)?;
        listener
            .listen(TICKET_CHANGES_CHANNEL)
            .await
            .map_err(unexpected)?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        tokio::spawn(Self::forward_changes(
            listener,
            app_id.clone(),
            changes.clone(),
            token.clone(),
        ));
        info!("Listening for ticket changes for app '{}'.", app_id);

        Ok(Self {
            pool,
            app_id,
            changes,
            _listener: Arc::new(token.drop_guard()),
        })
    }

    async fn forward_changes(
        mut listener: PgListener,
        app_id: String,
        changes: broadcast::Sender<()>,
        token: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = listener.try_recv() => received,
            };
            match received {
                Ok(Some(notification)) => {
                    if notification.payload() == app_id {
                        // No receivers simply means no live queries are open.
                        let _ = changes.send(());
                    }
                }
                // The connection dropped and is re-established on the next call;
                // notifications may have been missed, so every watcher re-reads.
                Ok(None) => {
                    warn!("Ticket change listener lost its connection; refreshing watchers.");
                    let _ = changes.send(());
                }
                Err(e) => {
                    error!("Ticket change listener failed to reconnect: {}", e);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(LISTENER_RETRY_DELAY) => {}
                    }
                }
            }
        }
        debug!("Ticket change listener for app '{}' stopped.", app_id);
    }

    async fn fetch(pool: &PgPool, app_id: &str, query: &TicketQuery) -> PortResult<Vec<Ticket>> {
        // No ORDER BY: ordering is the consumer's job.
        let records = sqlx::query_as::<_, TicketRecord>(
            "SELECT id, title, description, status, owner_id, created_at FROM tickets \
             WHERE app_id = $1 AND ($2::uuid IS NULL OR owner_id = $2)",
        )
        .bind(app_id)
        .bind(query.owner())
        .fetch_all(pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(TicketRecord::to_domain).collect()
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn watch(&self, query: TicketQuery) -> PortResult<SnapshotStream> {
        // Subscribe before the first read so no change slips in between.
        let mut changes = self.changes.subscribe();
        let pool = self.pool.clone();
        let app_id = self.app_id.clone();
        info!("Opened live query {:?} for app '{}'.", query, app_id);

        let stream = async_stream::stream! {
            yield PgTicketStore::fetch(&pool, &app_id, &query).await;
            loop {
                match changes.recv().await {
                    Ok(()) => yield PgTicketStore::fetch(&pool, &app_id, &query).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Live query lagged behind {} changes; re-reading.", skipped);
                        yield PgTicketStore::fetch(&pool, &app_id, &query).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn insert(&self, ticket: NewTicket) -> PortResult<TicketId> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO tickets (id, app_id, title, description, status, owner_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&self.app_id)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(ticket.status.as_str())
        .bind(ticket.owner_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(id)
    }

    async fn update_status(&self, id: TicketId, status: TicketStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE tickets SET status = $1 WHERE id = $2 AND app_id = $3")
            .bind(status.as_str())
            .bind(id)
            .bind(&self.app_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Ticket {} not found", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: TicketId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1 AND app_id = $2")
            .bind(id)
            .bind(&self.app_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Ticket {} not found", id)));
        }
        Ok(())
    }
}
