//! services/tracker/src/controller/mod.rs
//!
//! The application state controller. One controller runs per application
//! instance as a single task: it owns the session manager, the live query and
//! the view-model, and publishes a fresh `TrackerState` after every change.

pub mod state;

pub use state::{Command, Phase, TicketForm, TrackerState};

use crate::repository::{Delivery, LiveQuery, TicketRepository};
use crate::session::SessionManager;
use commission_guard_core::domain::{Session, ViewFilter};
use commission_guard_core::ports::{IdentityProvider, TicketStore};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commands queued per instance before the sender waits.
const COMMAND_BUFFER: usize = 32;

/// The caller's side of a running controller.
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<TrackerState>,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Queues a command. Returns `false` once the controller has stopped.
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn state(&self) -> watch::Receiver<TrackerState> {
        self.state.clone()
    }

    /// Closes the command channel and waits for the controller to tear down.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            error!("Controller task ended abnormally: {}", e);
        }
    }
}

pub struct Controller {
    state: TrackerState,
    sessions: SessionManager,
    repository: TicketRepository,
    live: Option<LiveQuery>,
    next_generation: u64,
    deliveries: mpsc::UnboundedSender<Delivery>,
    published: watch::Sender<TrackerState>,
}

impl Controller {
    /// Starts a controller for one application instance. `token`, if present,
    /// is used for the initial sign-in instead of anonymous sign-in.
    pub fn spawn(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn TicketStore>,
        token: Option<String>,
    ) -> ControllerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (published, state_rx) = watch::channel(TrackerState::default());

        let controller = Controller {
            state: TrackerState::default(),
            sessions: SessionManager::new(identity),
            repository: TicketRepository::new(store),
            live: None,
            next_generation: 0,
            deliveries: delivery_tx,
            published,
        };
        let task = tokio::spawn(controller.run(token, command_rx, delivery_rx));

        ControllerHandle {
            commands: command_tx,
            state: state_rx,
            task,
        }
    }

    async fn run(
        mut self,
        token: Option<String>,
        mut commands: mpsc::Receiver<Command>,
        mut deliveries: mpsc::UnboundedReceiver<Delivery>,
    ) {
        let mut session_changes = self.sessions.subscribe();
        self.sessions.initialize(token.as_deref()).await;
        let session = session_changes.borrow_and_update().clone();
        self.apply_session(session, true);
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                changed = session_changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let session = session_changes.borrow_and_update().clone();
                    self.apply_session(session, false);
                }
                Some(delivery) = deliveries.recv() => self.apply_delivery(delivery),
            }
            self.publish();
        }

        self.teardown();
        info!("Controller stopped.");
    }

    fn publish(&self) {
        self.published.send_replace(self.state.clone());
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetTitle(title) => self.state.form.title = title,
            Command::SetDescription(description) => self.state.form.description = description,
            Command::Submit => {
                let created = self
                    .repository
                    .create(
                        self.state.session.as_ref(),
                        &self.state.form.title,
                        &self.state.form.description,
                    )
                    .await;
                if created.is_some() {
                    self.state.form.clear();
                }
            }
            Command::ChangeStatus { id, status } => {
                self.repository.update_status(id, status).await;
            }
            Command::SwitchView(view) => self.switch_view(view),
            Command::RequestDelete(id) => {
                if self.state.can_delete(id) {
                    self.state.pending_delete = Some(id);
                } else {
                    warn!("Delete of ticket {} refused: not owned by this session.", id);
                }
            }
            Command::ConfirmDelete => match self.state.pending_delete.take() {
                Some(id) => self.repository.delete(id).await,
                None => warn!("Delete confirmed with no ticket pending."),
            },
            Command::CancelDelete => self.state.pending_delete = None,
            Command::SignOut => self.sessions.sign_out().await,
        }
    }

    fn apply_session(&mut self, session: Option<Session>, initial: bool) {
        if !initial && session == self.state.session {
            return;
        }
        self.teardown();
        self.state.tickets.clear();
        self.state.pending_delete = None;
        self.state.session = session.clone();

        match session {
            Some(session) => self.resubscribe(&session),
            None if initial => {
                self.state.phase = Phase::Blocked("Unable to establish a session.".to_string())
            }
            None => self.state.phase = Phase::Blocked("Signed out.".to_string()),
        }
    }

    fn switch_view(&mut self, view: ViewFilter) {
        if view == self.state.view {
            return;
        }
        info!("Switching view to {:?}.", view);
        self.state.view = view;
        self.state.pending_delete = None;

        let Some(session) = self.state.session.clone() else {
            return;
        };
        // All tickets and Stats share one query; keep it open between them.
        let query = view.query_for(&session);
        if self.live.as_ref().map(LiveQuery::query) == Some(query) {
            return;
        }
        self.resubscribe(&session);
    }

    /// Tears down the open live query before opening the next one.
    fn resubscribe(&mut self, session: &Session) {
        self.teardown();
        self.state.tickets.clear();
        self.next_generation += 1;
        let query = self.state.view.query_for(session);
        self.live = Some(
            self.repository
                .subscribe(query, self.next_generation, self.deliveries.clone()),
        );
        self.state.phase = Phase::Subscribed;
    }

    fn teardown(&mut self) {
        if let Some(live) = self.live.take() {
            live.cancel();
        }
    }

    fn apply_delivery(&mut self, delivery: Delivery) {
        let current = self.live.as_ref().map(LiveQuery::generation);
        if current != Some(delivery.generation) {
            debug!(
                "Discarding snapshot from stale live query generation {}.",
                delivery.generation
            );
            return;
        }
        match delivery.result {
            Ok(tickets) => {
                self.state.tickets = tickets;
                self.state.phase = Phase::Ready;
                if let Some(id) = self.state.pending_delete {
                    if self.state.ticket(id).is_none() {
                        self.state.pending_delete = None;
                    }
                }
            }
            Err(e) => error!("Live query failed; keeping the current list: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryBackend;
    use commission_guard_core::domain::{Ticket, TicketStatus};
    use commission_guard_core::ports::PortError;
    use uuid::Uuid;

    fn controller(backend: &MemoryBackend) -> (Controller, mpsc::UnboundedReceiver<Delivery>) {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (published, _) = watch::channel(TrackerState::default());
        let controller = Controller {
            state: TrackerState::default(),
            sessions: SessionManager::new(Arc::new(backend.clone())),
            repository: TicketRepository::new(Arc::new(backend.clone())),
            live: None,
            next_generation: 0,
            deliveries: delivery_tx,
            published,
        };
        (controller, delivery_rx)
    }

    fn ticket(owner_id: Uuid) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            title: "ghost".to_string(),
            description: "from an old query".to_string(),
            status: TicketStatus::Open,
            owner_id,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let backend = MemoryBackend::new();
        let (mut controller, _rx) = controller(&backend);
        let session = Session {
            id: Uuid::new_v4(),
            anonymous: true,
        };
        controller.apply_session(Some(session.clone()), true);
        let first = controller.live.as_ref().unwrap().generation();

        controller.switch_view(ViewFilter::AllTickets);
        let second = controller.live.as_ref().unwrap().generation();
        assert_ne!(first, second);

        controller.apply_delivery(Delivery {
            generation: first,
            result: Ok(vec![ticket(session.id)]),
        });
        assert!(controller.state.tickets.is_empty());
        assert_eq!(controller.state.phase, Phase::Subscribed);

        controller.apply_delivery(Delivery {
            generation: second,
            result: Ok(vec![ticket(session.id)]),
        });
        assert_eq!(controller.state.tickets.len(), 1);
        assert_eq!(controller.state.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_delivery_error_keeps_current_list() {
        let backend = MemoryBackend::new();
        let (mut controller, _rx) = controller(&backend);
        let session = Session {
            id: Uuid::new_v4(),
            anonymous: true,
        };
        controller.apply_session(Some(session.clone()), true);
        let generation = controller.live.as_ref().unwrap().generation();

        controller.apply_delivery(Delivery {
            generation,
            result: Ok(vec![ticket(session.id)]),
        });
        controller.apply_delivery(Delivery {
            generation,
            result: Err(PortError::Unexpected("connection reset".to_string())),
        });
        assert_eq!(controller.state.tickets.len(), 1);
        assert_eq!(controller.state.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_switching_between_all_and_stats_keeps_query() {
        let backend = MemoryBackend::new();
        let (mut controller, _rx) = controller(&backend);
        let session = Session {
            id: Uuid::new_v4(),
            anonymous: true,
        };
        controller.apply_session(Some(session), true);
        controller.switch_view(ViewFilter::AllTickets);
        let generation = controller.live.as_ref().unwrap().generation();

        controller.switch_view(ViewFilter::Stats);
        assert_eq!(controller.live.as_ref().unwrap().generation(), generation);
        assert_eq!(controller.state.view, ViewFilter::Stats);
    }

    #[tokio::test]
    async fn test_no_initial_session_blocks() {
        let backend = MemoryBackend::new();
        let (mut controller, _rx) = controller(&backend);
        controller.apply_session(None, true);
        assert!(matches!(controller.state.phase, Phase::Blocked(_)));
        assert!(controller.live.is_none());
    }

    #[tokio::test]
    async fn test_request_delete_requires_ownership() {
        let backend = MemoryBackend::new();
        let (mut controller, _rx) = controller(&backend);
        let session = Session {
            id: Uuid::new_v4(),
            anonymous: true,
        };
        controller.apply_session(Some(session.clone()), true);
        let generation = controller.live.as_ref().unwrap().generation();
        let mine = ticket(session.id);
        let theirs = ticket(Uuid::new_v4());
        controller.apply_delivery(Delivery {
            generation,
            result: Ok(vec![mine.clone(), theirs.clone()]),
        });

        controller.handle_command(Command::RequestDelete(theirs.id)).await;
        assert_eq!(controller.state.pending_delete, None);

        controller.handle_command(Command::RequestDelete(mine.id)).await;
        assert_eq!(controller.state.pending_delete, Some(mine.id));

        // The pending ticket disappearing from the snapshot closes the dialog.
        controller.apply_delivery(Delivery {
            generation,
            result: Ok(vec![theirs]),
        });
        assert_eq!(controller.state.pending_delete, None);
    }
}
