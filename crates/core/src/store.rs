//! The conversation store.
//!
//! Every persona owns an ordered log of [`Message`]s. The store is the only
//! place where message text is mutated, and it refuses every mutation that
//! would break the reveal state machine: terminal messages are frozen, and
//! a revealing message only ever grows.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chatzoo_model::PersonaId;
use serde::Serialize;
use tokio::sync::mpsc;

/// Identifies a message, unique within a store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    fn generate(seq: u64) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: u16 = rand::random();
        Self(format!("{millis:x}-{seq}-{suffix:04x}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Where a message is in its reveal.
///
/// `Revealing` moves to either `Complete` or `Aborted`, both of which are
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealState {
    Revealing,
    Complete,
    Aborted,
}

impl RevealState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RevealState::Revealing)
    }
}

/// A message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    persona: PersonaId,
    text: String,
    reveal_state: RevealState,
}

impl Message {
    #[inline]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline]
    pub fn persona(&self) -> PersonaId {
        self.persona
    }

    /// Returns the text revealed so far.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn reveal_state(&self) -> RevealState {
        self.reveal_state
    }
}

/// A message that is about to be appended to a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub role: Role,
    pub text: String,
    pub reveal_state: RevealState,
}

impl NewMessage {
    /// A complete message sent by the user.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            reveal_state: RevealState::Complete,
        }
    }

    /// An empty assistant message waiting for its reveal.
    #[inline]
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            text: String::new(),
            reveal_state: RevealState::Revealing,
        }
    }
}

/// A change made to the store, in the order it was made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    Appended(Message),
    TextUpdated {
        persona: PersonaId,
        id: MessageId,
        text: String,
    },
    StateChanged {
        persona: PersonaId,
        id: MessageId,
        state: RevealState,
    },
    Cleared(PersonaId),
}

#[derive(Default)]
struct StoreInner {
    conversations: HashMap<PersonaId, Vec<Message>>,
    next_seq: u64,
    subscribers: Vec<mpsc::UnboundedSender<StoreEvent>>,
}

impl StoreInner {
    fn emit(&mut self, event: StoreEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn find_mut(
        &mut self,
        persona: PersonaId,
        id: &MessageId,
    ) -> Option<&mut Message> {
        // Reveals almost always target the newest message.
        self.conversations
            .get_mut(&persona)?
            .iter_mut()
            .rev()
            .find(|msg| &msg.id == id)
    }

    /// Moves a revealing message to a terminal state, optionally replacing
    /// its text first.
    fn finish(
        &mut self,
        persona: PersonaId,
        id: &MessageId,
        state: RevealState,
        final_text: Option<&str>,
    ) -> bool {
        let Some(msg) = self.find_mut(persona, id) else {
            trace!("finishing unknown message {id}, ignored");
            return false;
        };
        if msg.reveal_state.is_terminal() {
            trace!("message {id} is already {:?}", msg.reveal_state);
            return false;
        }

        let replaced = match final_text {
            Some(text) if text != msg.text => {
                msg.text = text.to_owned();
                true
            }
            _ => false,
        };
        msg.reveal_state = state;
        let text = replaced.then(|| msg.text.clone());

        if let Some(text) = text {
            self.emit(StoreEvent::TextUpdated {
                persona,
                id: id.clone(),
                text,
            });
        }
        self.emit(StoreEvent::StateChanged {
            persona,
            id: id.clone(),
            state,
        });
        true
    }
}

/// Shared, per-persona message logs.
///
/// Clones refer to the same store.
#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ConversationStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Every mutation is completed before the guard is released, so a
        // panicking subscriber can't leave a half-written message behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message to the conversation of `persona` and returns it
    /// with its assigned id.
    pub fn append(&self, persona: PersonaId, new_msg: NewMessage) -> Message {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let msg = Message {
            id: MessageId::generate(seq),
            role: new_msg.role,
            persona,
            text: new_msg.text,
            reveal_state: new_msg.reveal_state,
        };
        debug!("appending {:?} message {} to {persona}", msg.role, msg.id);
        inner
            .conversations
            .entry(persona)
            .or_default()
            .push(msg.clone());
        inner.emit(StoreEvent::Appended(msg.clone()));
        msg
    }

    /// Replaces the text of a revealing message.
    ///
    /// The new text must extend the current one. Updates to unknown or
    /// terminal messages, and updates that would shrink or rewrite the
    /// text, are ignored. Returns whether the update was applied.
    pub fn update_text<S: Into<String>>(
        &self,
        persona: PersonaId,
        id: &MessageId,
        new_text: S,
    ) -> bool {
        let new_text = new_text.into();
        let mut inner = self.lock();
        let Some(msg) = inner.find_mut(persona, id) else {
            trace!("updating unknown message {id}, ignored");
            return false;
        };
        if msg.reveal_state.is_terminal() {
            trace!("updating {:?} message {id}, ignored", msg.reveal_state);
            return false;
        }
        if !new_text.starts_with(msg.text.as_str()) {
            warn!("non-monotonic update to message {id}, ignored");
            return false;
        }
        if new_text.len() == msg.text.len() {
            return true;
        }

        msg.text.clone_from(&new_text);
        inner.emit(StoreEvent::TextUpdated {
            persona,
            id: id.clone(),
            text: new_text,
        });
        true
    }

    /// Marks a revealing message as complete.
    ///
    /// Returns `false` if the message is unknown or already terminal.
    #[inline]
    pub fn mark_complete(&self, persona: PersonaId, id: &MessageId) -> bool {
        self.lock().finish(persona, id, RevealState::Complete, None)
    }

    /// Marks a revealing message as aborted.
    ///
    /// The text revealed so far is kept unless `fallback_text` is given.
    /// Returns `false` if the message is unknown or already terminal.
    #[inline]
    pub fn mark_aborted(
        &self,
        persona: PersonaId,
        id: &MessageId,
        fallback_text: Option<&str>,
    ) -> bool {
        self.lock()
            .finish(persona, id, RevealState::Aborted, fallback_text)
    }

    /// Replaces the text of a revealing message with `fallback_text` and
    /// marks it as complete. This is how failed answers end.
    ///
    /// Returns `false` if the message is unknown or already terminal.
    #[inline]
    pub fn complete_with_fallback(
        &self,
        persona: PersonaId,
        id: &MessageId,
        fallback_text: &str,
    ) -> bool {
        self.lock().finish(
            persona,
            id,
            RevealState::Complete,
            Some(fallback_text),
        )
    }

    /// Returns a snapshot of the conversation of `persona`.
    pub fn conversation(&self, persona: PersonaId) -> Vec<Message> {
        self.lock()
            .conversations
            .get(&persona)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns a snapshot of one message.
    pub fn message(&self, persona: PersonaId, id: &MessageId) -> Option<Message> {
        self.lock().find_mut(persona, id).cloned()
    }

    /// Drops the conversation of `persona`, aborting the messages that are
    /// still revealing.
    pub fn clear(&self, persona: PersonaId) {
        let mut inner = self.lock();
        let revealing: Vec<_> = inner
            .conversations
            .get(&persona)
            .into_iter()
            .flatten()
            .filter(|msg| !msg.reveal_state.is_terminal())
            .map(|msg| msg.id.clone())
            .collect();
        for id in &revealing {
            inner.finish(persona, id, RevealState::Aborted, None);
        }
        if inner.conversations.remove(&persona).is_some() {
            debug!("cleared conversation of {persona}");
            inner.emit(StoreEvent::Cleared(persona));
        }
    }

    /// Returns a receiver of every change made after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn placeholder(store: &ConversationStore, persona: PersonaId) -> MessageId {
        store
            .append(persona, NewMessage::assistant_placeholder())
            .id()
            .clone()
    }

    #[test]
    fn test_append_keeps_order_and_unique_ids() {
        let store = ConversationStore::new();
        let mut ids = HashSet::new();
        for i in 0..50 {
            let msg = store.append(PersonaId::Cat, NewMessage::user(i.to_string()));
            assert_eq!(msg.persona(), PersonaId::Cat);
            assert!(ids.insert(msg.id().clone()));
        }
        let texts: Vec<_> = store
            .conversation(PersonaId::Cat)
            .iter()
            .map(|msg| msg.text().to_owned())
            .collect();
        let expected: Vec<_> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(texts, expected);
        assert!(store.conversation(PersonaId::Sloth).is_empty());
    }

    #[test]
    fn test_update_text_grows() {
        let store = ConversationStore::new();
        let id = placeholder(&store, PersonaId::Sloth);

        assert!(store.update_text(PersonaId::Sloth, &id, "S"));
        assert!(store.update_text(PersonaId::Sloth, &id, "Sl"));
        assert!(!store.update_text(PersonaId::Sloth, &id, "X"));
        assert!(!store.update_text(PersonaId::Sloth, &id, ""));

        let msg = store.message(PersonaId::Sloth, &id).unwrap();
        assert_eq!(msg.text(), "Sl");
        assert_eq!(msg.reveal_state(), RevealState::Revealing);
    }

    #[test]
    fn test_stale_updates_are_ignored() {
        let store = ConversationStore::new();
        let id = placeholder(&store, PersonaId::Sloth);

        // Wrong persona, then unknown id.
        assert!(!store.update_text(PersonaId::Cat, &id, "a"));
        let other = MessageId("nope".to_owned());
        assert!(!store.update_text(PersonaId::Sloth, &other, "a"));
        assert!(!store.mark_complete(PersonaId::Sloth, &other));

        assert!(store.update_text(PersonaId::Sloth, &id, "Hi"));
        assert!(store.mark_complete(PersonaId::Sloth, &id));
        assert!(!store.update_text(PersonaId::Sloth, &id, "Hi there"));

        let msg = store.message(PersonaId::Sloth, &id).unwrap();
        assert_eq!(msg.text(), "Hi");
    }

    #[test]
    fn test_terminal_transitions_are_idempotent() {
        let store = ConversationStore::new();
        let id = placeholder(&store, PersonaId::Goldfish);
        store.update_text(PersonaId::Goldfish, &id, "Blu");

        assert!(store.mark_aborted(PersonaId::Goldfish, &id, None));
        assert!(!store.mark_aborted(PersonaId::Goldfish, &id, Some("x")));
        assert!(!store.mark_complete(PersonaId::Goldfish, &id));
        assert!(!store.complete_with_fallback(PersonaId::Goldfish, &id, "x"));

        let msg = store.message(PersonaId::Goldfish, &id).unwrap();
        assert_eq!(msg.text(), "Blu");
        assert_eq!(msg.reveal_state(), RevealState::Aborted);

        let id = placeholder(&store, PersonaId::Goldfish);
        assert!(store.mark_complete(PersonaId::Goldfish, &id));
        assert!(!store.mark_aborted(PersonaId::Goldfish, &id, None));
        let msg = store.message(PersonaId::Goldfish, &id).unwrap();
        assert_eq!(msg.reveal_state(), RevealState::Complete);
    }

    #[test]
    fn test_fallback_replaces_partial_text() {
        let store = ConversationStore::new();
        let id = placeholder(&store, PersonaId::Sloth);
        store.update_text(PersonaId::Sloth, &id, "Slo");

        assert!(store.complete_with_fallback(PersonaId::Sloth, &id, "Oops"));
        let msg = store.message(PersonaId::Sloth, &id).unwrap();
        assert_eq!(msg.text(), "Oops");
        assert_eq!(msg.reveal_state(), RevealState::Complete);
    }

    #[test]
    fn test_clear_aborts_revealing_messages() {
        let store = ConversationStore::new();
        store.append(PersonaId::Sloth, NewMessage::user("hi"));
        let id = placeholder(&store, PersonaId::Sloth);
        let mut events = store.subscribe();

        store.clear(PersonaId::Sloth);
        assert!(store.conversation(PersonaId::Sloth).is_empty());
        assert!(!store.update_text(PersonaId::Sloth, &id, "late"));

        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::StateChanged {
                persona: PersonaId::Sloth,
                id,
                state: RevealState::Aborted,
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::Cleared(PersonaId::Sloth)
        );
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_subscribers_see_changes_in_order() {
        let store = ConversationStore::new();
        let mut events = store.subscribe();
        let dropped = store.subscribe();
        drop(dropped);

        let id = placeholder(&store, PersonaId::Sloth);
        store.update_text(PersonaId::Sloth, &id, "S");
        store.update_text(PersonaId::Sloth, &id, "S");
        store.update_text(PersonaId::Sloth, &id, "Sl");
        store.mark_complete(PersonaId::Sloth, &id);

        assert!(matches!(events.try_recv(), Ok(StoreEvent::Appended(_))));
        let mut texts = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                StoreEvent::TextUpdated { text, .. } => texts.push(text),
                StoreEvent::StateChanged { state, .. } => {
                    assert_eq!(state, RevealState::Complete);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(texts, ["S", "Sl"]);
        assert_eq!(store.lock().subscribers.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = ConversationStore::new();
        let id = placeholder(&store, PersonaId::Cat);
        let snapshot = store.conversation(PersonaId::Cat);
        store.update_text(PersonaId::Cat, &id, "Meow");
        assert_eq!(snapshot[0].text(), "");
        assert_eq!(store.conversation(PersonaId::Cat)[0].text(), "Meow");
    }
}
