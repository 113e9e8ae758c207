//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is one JSON object `{"event": "<name>", "data": <payload>}`
//! with camelCase event and field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{Game, Username};
use crate::session::{SeatRoles, Session, SessionError};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Bind an identity to this connection.
    RegisterUsername(String),

    /// List all sessions.
    GetSessions,

    /// Create a session hosted by the caller.
    CreateSession(CreateSessionRequest),

    /// Join a session, with its password if it has one.
    JoinSession(JoinSessionRequest),

    /// Re-attach to a session from the game page.
    JoinLobby(SessionRef),

    /// Leave a session.
    LeaveLobby(SessionRef),

    /// Flip the caller's readiness.
    ToggleReady(SessionRef),

    /// Host sets the seat→role map.
    UpdateRoles(UpdateRolesRequest),

    /// Host starts the game.
    StartGame(SessionRef),

    /// Resend the full lobby and game state to the caller.
    GetSessionState(SessionRef),

    /// Draft a role. The session defaults to the caller's seat.
    PickRole(PickRoleRequest),

    /// Ask for a private card offer.
    RequestCards(SessionRef),

    /// Keep one offered card.
    PickCard(CardRequest),

    /// Collect coins.
    TakeCoins(SessionRef),

    /// Build a district from hand.
    BuildDistrict(CardRequest),

    /// Host deletes the session.
    RemoveSession(SessionRef),

    /// Host removes another member.
    KickPlayer(KickRequest),
}

impl ClientMessage {
    /// Event name, as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::RegisterUsername(_) => "registerUsername",
            ClientMessage::GetSessions => "getSessions",
            ClientMessage::CreateSession(_) => "createSession",
            ClientMessage::JoinSession(_) => "joinSession",
            ClientMessage::JoinLobby(_) => "joinLobby",
            ClientMessage::LeaveLobby(_) => "leaveLobby",
            ClientMessage::ToggleReady(_) => "toggleReady",
            ClientMessage::UpdateRoles(_) => "updateRoles",
            ClientMessage::StartGame(_) => "startGame",
            ClientMessage::GetSessionState(_) => "getSessionState",
            ClientMessage::PickRole(_) => "pickRole",
            ClientMessage::RequestCards(_) => "requestCards",
            ClientMessage::PickCard(_) => "pickCard",
            ClientMessage::TakeCoins(_) => "takeCoins",
            ClientMessage::BuildDistrict(_) => "buildDistrict",
            ClientMessage::RemoveSession(_) => "removeSession",
            ClientMessage::KickPlayer(_) => "kickPlayer",
        }
    }
}

impl ClientMessage {
    /// Strip surrounding whitespace from every session name in the payload,
    /// so each handler sees the name the directory stores.
    pub fn trim_session_names(&mut self) {
        fn trim(name: &mut String) {
            let trimmed = name.trim();
            if trimmed.len() != name.len() {
                *name = trimmed.to_string();
            }
        }

        match self {
            ClientMessage::RegisterUsername(_) | ClientMessage::GetSessions => {}
            ClientMessage::CreateSession(req) => trim(&mut req.name),
            ClientMessage::JoinSession(req) => trim(&mut req.session_name),
            ClientMessage::JoinLobby(req)
            | ClientMessage::LeaveLobby(req)
            | ClientMessage::ToggleReady(req)
            | ClientMessage::StartGame(req)
            | ClientMessage::GetSessionState(req)
            | ClientMessage::RequestCards(req)
            | ClientMessage::TakeCoins(req)
            | ClientMessage::RemoveSession(req) => trim(&mut req.session_name),
            ClientMessage::UpdateRoles(req) => trim(&mut req.session_name),
            ClientMessage::PickRole(req) => {
                if let Some(name) = req.session_name.as_mut() {
                    trim(name);
                }
            }
            ClientMessage::PickCard(req) | ClientMessage::BuildDistrict(req) => {
                trim(&mut req.session_name)
            }
            ClientMessage::KickPlayer(req) => trim(&mut req.session_name),
        }
    }
}

/// Payload of `createSession`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Session name.
    pub name: String,
    /// Must match the registered identity when present.
    #[serde(default)]
    pub host: Option<String>,
    /// Empty or absent means open.
    #[serde(default)]
    pub password: Option<String>,
    /// Zero or absent falls back to the server default.
    #[serde(default)]
    pub max_players: Option<usize>,
}

/// Payload of `joinSession`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    /// Target session.
    pub session_name: String,
    /// Must match the registered identity when present.
    #[serde(default)]
    pub username: Option<String>,
    /// Session password, if it has one.
    #[serde(default)]
    pub password: Option<String>,
}

/// Payload naming a session, and optionally the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    /// Target session.
    pub session_name: String,
    /// Must match the registered identity when present.
    #[serde(default)]
    pub username: Option<String>,
}

impl SessionRef {
    /// Reference to `session_name` without a claimed username.
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            username: None,
        }
    }
}

/// Payload of `updateRoles`.
///
/// Seats stay string-keyed here: a frame with `data` ahead of `event` is
/// buffered by serde, and buffered map keys cannot be read back as integers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRolesRequest {
    /// Target session.
    pub session_name: String,
    /// Seat number (decimal string) → role name.
    pub roles: SeatRoles,
}

/// Payload of `pickRole`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickRoleRequest {
    /// Defaults to the caller's current session.
    #[serde(default)]
    pub session_name: Option<String>,
    /// Role to draft.
    pub role: String,
}

/// Payload of `pickCard` and `buildDistrict`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRequest {
    /// Target session.
    pub session_name: String,
    /// District id.
    pub card: String,
}

/// Payload of `kickPlayer`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    /// Target session.
    pub session_name: String,
    /// Member to remove.
    pub player_to_kick: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Identity bound.
    Registered(RegisteredInfo),

    /// Acknowledgment for `createSession`.
    Ack(AckInfo),

    /// Directory snapshot.
    SessionsUpdated(Vec<SessionView>),

    /// Lobby snapshot for one session.
    LobbyStateUpdated(SessionView),

    /// Join accepted.
    JoinedSession(String),

    /// Join rejected.
    JoinSessionError(String),

    /// The host removed the session.
    LobbyClosed,

    /// The host removed the recipient.
    Kicked(KickedInfo),

    /// A game began.
    GameStarted(GameStartedInfo),

    /// Draft opened.
    StartRoleSelection(RoleSelectionInfo),

    /// Turn pointer moved.
    NextPicker(NextPickerInfo),

    /// Role assignments changed.
    RolesSelected(Vec<PlayerView>),

    /// Phase changed.
    StartGamePhase(PhaseInfo),

    /// Private card offer.
    OfferCards(OfferInfo),

    /// Hands or built lists changed.
    CardsUpdated(Vec<PlayerView>),

    /// Coin balances changed.
    CoinsUpdated(Vec<PlayerView>),

    /// Request rejected.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown(ShutdownInfo),
}

/// Payload of `registered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredInfo {
    /// Identity now bound to the connection.
    pub username: Username,
    /// Session the identity still sits in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    /// Crate version of the server.
    pub server_version: String,
}

/// Payload of `ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckInfo {
    /// Event being acknowledged.
    pub request: String,
    /// Whether it was applied.
    pub success: bool,
    /// Reason for a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `kicked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickedInfo {
    /// Session the recipient was removed from.
    pub session_name: String,
}

/// Payload of `gameStarted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedInfo {
    /// Session the game runs in.
    pub session_name: String,
    /// Seated players in turn order.
    pub players: Vec<PlayerView>,
}

/// Payload of `startRoleSelection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSelectionInfo {
    /// Draft pool.
    pub available_roles: Vec<String>,
    /// Seated players in turn order.
    pub players: Vec<PlayerView>,
    /// Identity that picks first.
    pub current_picker_id: Username,
}

/// Payload of `nextPicker`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPickerInfo {
    /// Identity whose turn it is.
    pub current_picker_id: Username,
    /// Remaining pool, sent during the draft only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_roles: Option<Vec<String>>,
}

/// Payload of `startGamePhase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseInfo {
    /// 1 = role draft, 2 = action.
    pub phase: u8,
}

/// Payload of `offerCards`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferInfo {
    /// Offered district ids.
    pub cards: Vec<String>,
}

/// Payload of `shutdown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownInfo {
    /// Human-readable reason.
    pub reason: String,
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Client view of a session. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session name.
    pub name: String,
    /// Current host.
    pub host: Username,
    /// Whether joining needs a password.
    pub has_password: bool,
    /// Capacity.
    pub max_players: usize,
    /// Members in join order.
    pub players: Vec<Username>,
    /// Members who toggled ready. The host is never listed.
    pub ready_players: Vec<Username>,
    /// Host's seat map, seat numbers as decimal keys.
    pub selected_roles: SeatRoles,
    /// Whether a game is running.
    pub in_game: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            name: session.name().to_string(),
            host: session.host().clone(),
            has_password: session.has_password(),
            max_players: session.max_players(),
            players: session.players().to_vec(),
            ready_players: session.ready_players().iter().cloned().collect(),
            selected_roles: session
                .role_map()
                .iter()
                .map(|(seat, role)| (seat.to_string(), role.clone()))
                .collect(),
            in_game: session.game().is_some(),
            created_at: session.created_at(),
        }
    }
}

/// Client view of one seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Identity.
    pub id: Username,
    /// Same as `id`; clients read either.
    pub username: Username,
    /// Drafted role.
    pub role: Option<String>,
    /// Coin balance.
    pub coins: u32,
    /// District ids in hand.
    pub hand: Vec<String>,
    /// District ids built, in build order.
    pub built: Vec<String>,
}

impl PlayerView {
    /// Every seated player, in turn order.
    pub fn snapshot(game: &Game) -> Vec<PlayerView> {
        game.order()
            .iter()
            .filter_map(|name| {
                game.player(name).map(|state| PlayerView {
                    id: name.clone(),
                    username: name.clone(),
                    role: state.role.clone(),
                    coins: state.coins,
                    hand: state.hand.clone(),
                    built: state.built.clone(),
                })
            })
            .collect()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Error with `code` and a message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&SessionError> for ServerError {
    fn from(err: &SessionError) -> Self {
        Self::new(ErrorCode::from(err), err.to_string())
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown session or member.
    NotFound,
    /// Duplicate session name.
    AlreadyExists,
    /// Password mismatch.
    WrongPassword,
    /// Session at capacity.
    Full,
    /// Caller may not do this.
    NotAuthorized,
    /// Wrong phase, wrong turn, or similar.
    FailedPrecondition,
    /// Malformed or empty field.
    InvalidArgument,
}

impl From<&SessionError> for ErrorCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => ErrorCode::NotFound,
            SessionError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            SessionError::WrongPassword => ErrorCode::WrongPassword,
            SessionError::Full(_) => ErrorCode::Full,
            SessionError::NotAuthorized(_) => ErrorCode::NotAuthorized,
            SessionError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            SessionError::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from UTF-8 JSON bytes (binary frames).
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Structured rejection.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}
