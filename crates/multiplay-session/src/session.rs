//! State shared by the host and client roles.

use multiplay_protocol::PlayerIndex;
use multiplay_protocol::messages::ChatLine;
use tokio::sync::mpsc;

use crate::chat::ChatHistory;
use crate::events::{EventBus, SessionEvent};
use crate::handler::HandlerManager;
use crate::player::Roster;
use crate::settings::SessionSettings;
use crate::{SessionError, SessionState};

/// Settings, state, roster, chat and handlers of one session.
///
/// `SessionBase` only stores. Deciding whether an operation is allowed in
/// the current state (a join while in game, say) is the job of the role
/// that owns it; the base only refuses moves the state machine itself
/// forbids.
#[derive(Debug)]
pub struct SessionBase {
    settings: SessionSettings,
    state: SessionState,
    roster: Roster,
    chat: ChatHistory,
    handlers: HandlerManager,
    events: EventBus,
}

impl SessionBase {
    pub fn new(settings: SessionSettings, chat_capacity: usize) -> Self {
        Self {
            settings: settings.validated(),
            state: SessionState::None,
            roster: Roster::new(),
            chat: ChatHistory::new(chat_capacity),
            handlers: HandlerManager::with_builtin(),
            events: EventBus::new(),
        }
    }

    // -- Settings ----------------------------------------------------------

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SessionSettings) {
        self.settings = settings.validated();
    }

    pub fn settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.settings
    }

    // -- State -------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `new` and emits [`SessionEvent::StateChanged`].
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] if the state machine forbids it.
    pub fn transition(&mut self, new: SessionState) -> Result<(), SessionError> {
        let old = self.state;
        if !old.can_transition_to(new) {
            return Err(SessionError::InvalidTransition { from: old, to: new });
        }
        self.state = new;
        tracing::info!(%old, %new, "session state changed");
        self.events.emit(SessionEvent::StateChanged { old, new });
        Ok(())
    }

    /// Fails unless the session is in `expected`.
    pub fn require_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::WrongState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Back to `None` with an empty roster and cleared handlers. Chat is
    /// kept so a UI can still show it after the session ended.
    pub fn reset(&mut self) {
        if self.state != SessionState::None {
            let old = self.state;
            self.state = SessionState::None;
            tracing::info!(%old, new = %SessionState::None, "session state changed");
            self.events.emit(SessionEvent::StateChanged {
                old,
                new: SessionState::None,
            });
        }
        self.roster.clear();
        self.handlers.clear();
    }

    // -- Roster, chat, handlers --------------------------------------------

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn chat(&self) -> &ChatHistory {
        &self.chat
    }

    /// Appends to the chat history and emits [`SessionEvent::ChatMessage`].
    pub fn record_chat(&mut self, line: ChatLine) {
        self.chat.push(line.clone());
        self.events.emit(SessionEvent::ChatMessage(line));
    }

    pub fn handlers(&self) -> &HandlerManager {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut HandlerManager {
        &mut self.handlers
    }

    // -- Events ------------------------------------------------------------

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.events.emit(event);
    }
}

/// Common surface of the host and client roles.
pub trait SessionRole {
    fn session(&self) -> &SessionBase;
    fn session_mut(&mut self) -> &mut SessionBase;

    /// Index of the local player; `None` on the host.
    fn local_player(&self) -> Option<PlayerIndex>;

    /// Puts one chat line on the wire.
    fn dispatch_chat(&mut self, line: &ChatLine);

    fn state(&self) -> SessionState {
        self.session().state()
    }

    /// Records `text` locally and sends it to the other participants.
    fn send_chat_message(&mut self, text: &str) {
        let line = ChatLine {
            sender: self.local_player(),
            text: text.to_owned(),
        };
        self.session_mut().record_chat(line.clone());
        self.dispatch_chat(&line);
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.session_mut().subscribe()
    }
}
