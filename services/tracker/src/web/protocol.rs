//! services/tracker/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! tracker service.

use crate::controller::Command;
use crate::view::Screen;
use commission_guard_core::domain::{TicketStatus, ViewFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts the application instance. This must be the first message sent on
    /// the connection. Without a token the session is anonymous.
    Init {
        #[serde(default)]
        token: Option<String>,
    },

    SetTitle { value: String },

    SetDescription { value: String },

    /// Submits the current form contents as a new ticket.
    Submit,

    ChangeStatus { ticket_id: Uuid, status: TicketStatus },

    SwitchView { view: ViewFilter },

    /// Opens the delete confirmation. Nothing is deleted yet.
    RequestDelete { ticket_id: Uuid },

    ConfirmDelete,

    CancelDelete,

    SignOut,
}

impl ClientMessage {
    /// Maps the message to a controller command. `Init` has no command form.
    pub fn into_command(self) -> Option<Command> {
        let command = match self {
            ClientMessage::Init { .. } => return None,
            ClientMessage::SetTitle { value } => Command::SetTitle(value),
            ClientMessage::SetDescription { value } => Command::SetDescription(value),
            ClientMessage::Submit => Command::Submit,
            ClientMessage::ChangeStatus { ticket_id, status } => Command::ChangeStatus {
                id: ticket_id,
                status,
            },
            ClientMessage::SwitchView { view } => Command::SwitchView(view),
            ClientMessage::RequestDelete { ticket_id } => Command::RequestDelete(ticket_id),
            ClientMessage::ConfirmDelete => Command::ConfirmDelete,
            ClientMessage::CancelDelete => Command::CancelDelete,
            ClientMessage::SignOut => Command::SignOut,
        };
        Some(command)
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full screen to draw, sent after every state change.
    Render { screen: Screen },

    /// Reports a protocol error to the client.
    Error { message: String },
}
