mod builder;
mod state;

use std::sync::Arc;

use chatzoo_model::PersonaId;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::store::{ConversationStore, Message, MessageId, StoreEvent};
pub use builder::SessionBuilder;
use state::Shared;

/// Why a prompt was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The prompt is empty or only has whitespaces.
    EmptyPrompt,
    /// Another reply is still being revealed.
    Busy,
}

/// The result of submitting a prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The prompt and a placeholder for the reply were appended to the
    /// conversation, and the reply is being revealed.
    Accepted {
        user_message: MessageId,
        reply_message: MessageId,
    },
    /// Nothing was changed.
    Rejected(RejectReason),
}

impl Submission {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted { .. })
    }

    /// Returns the id of the reply placeholder, if accepted.
    #[inline]
    pub fn reply_message(&self) -> Option<&MessageId> {
        match self {
            Submission::Accepted { reply_message, .. } => Some(reply_message),
            Submission::Rejected(_) => None,
        }
    }
}

/// A chat session with the personas.
///
/// The session owns the conversations, and coordinates the answer source
/// with the reveal engine. Every operation returns immediately; replies are
/// revealed by background tasks, which can be observed through
/// [`Session::subscribe`].
///
/// Dropping the session cancels every reveal in flight.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Returns the persona the user is talking to.
    #[inline]
    pub fn active_persona(&self) -> PersonaId {
        self.shared.active_persona()
    }

    /// Makes `persona` the active one.
    ///
    /// Reveals of the other personas are cancelled, and the conversation
    /// being left is wiped if the history policy says so.
    #[inline]
    pub fn switch_persona(&self, persona: PersonaId) {
        self.shared.switch_persona(persona);
    }

    /// Submits a prompt to the active persona.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[inline]
    pub fn send_message(&self, prompt: &str) -> Submission {
        self.submit(self.active_persona(), prompt)
    }

    /// Submits a prompt to `persona`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[inline]
    pub fn submit(&self, persona: PersonaId, prompt: &str) -> Submission {
        self.shared.submit(persona, prompt)
    }

    /// Stops revealing the reply of the active persona, keeping what was
    /// already shown. Returns `false` if there was nothing to stop.
    #[inline]
    pub fn cancel(&self) -> bool {
        self.shared.cancel(self.active_persona())
    }

    /// Returns `true` if any reply is being revealed.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.shared.is_busy()
    }

    /// Waits until no reply is being revealed.
    pub async fn idle(&self) {
        let mut busy_rx = self.shared.watch_busy();
        // The sender lives as long as `self`.
        _ = busy_rx.wait_for(|busy| !*busy).await;
    }

    /// Returns the last answer source failure, until it's dismissed.
    #[inline]
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    #[inline]
    pub fn dismiss_error(&self) {
        self.shared.dismiss_error();
    }

    /// Returns a snapshot of the conversation with `persona`.
    #[inline]
    pub fn conversation(&self, persona: PersonaId) -> Vec<Message> {
        self.shared.store.conversation(persona)
    }

    #[inline]
    pub fn store(&self) -> &ConversationStore {
        &self.shared.store
    }

    /// Returns a receiver of every change made to the conversations.
    #[inline]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        self.shared.store.subscribe()
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl Session {
    fn from_builder(builder: SessionBuilder) -> Self {
        let SessionBuilder {
            client,
            config,
            initial_persona,
            on_idle,
        } = builder;

        let shared = Shared::new(client, config, initial_persona, on_idle);
        Self {
            shared: Arc::new(shared),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}
