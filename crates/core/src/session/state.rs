use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatzoo_model::{AnswerRequest, PersonaId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{RejectReason, Submission};
use crate::answer_client::AnswerClient;
use crate::config::{ConcurrencyPolicy, HistoryPolicy, SessionConfig};
use crate::persona;
use crate::reveal::{RevealEngine, RevealOutcome, RevealTarget};
use crate::store::{ConversationStore, MessageId, NewMessage};

/// A reveal in flight.
struct RevealSession {
    id: u64,
    message_id: MessageId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct SessionState {
    active_persona: PersonaId,
    reveals: HashMap<PersonaId, RevealSession>,
    last_error: Option<String>,
    next_reveal_id: u64,
}

/// The part of a session that reveal tasks hold on to.
pub(super) struct Shared {
    pub(super) store: ConversationStore,
    pub(super) config: SessionConfig,
    client: AnswerClient,
    engine: RevealEngine,
    state: Mutex<SessionState>,
    busy_tx: watch::Sender<bool>,
    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Shared {
    pub(super) fn new(
        client: AnswerClient,
        config: SessionConfig,
        initial_persona: PersonaId,
        on_idle: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Self {
        let store = ConversationStore::new();
        let engine = RevealEngine::new(store.clone(), config.pacing)
            .with_fallback_text(config.fallback_text.as_str())
            .with_source_timeout(config.source_timeout);
        let client = client.with_retry(config.retry);
        let (busy_tx, _) = watch::channel(false);
        Self {
            store,
            config,
            client,
            engine,
            state: Mutex::new(SessionState {
                active_persona: initial_persona,
                reveals: HashMap::new(),
                last_error: None,
                next_reveal_id: 1,
            }),
            busy_tx,
            on_idle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(super) fn active_persona(&self) -> PersonaId {
        self.lock().active_persona
    }

    #[inline]
    pub(super) fn is_busy(&self) -> bool {
        !self.lock().reveals.is_empty()
    }

    #[inline]
    pub(super) fn watch_busy(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    #[inline]
    pub(super) fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    #[inline]
    pub(super) fn dismiss_error(&self) {
        self.lock().last_error = None;
    }

    pub(super) fn submit(
        self: &Arc<Self>,
        persona: PersonaId,
        prompt: &str,
    ) -> Submission {
        if prompt.trim().is_empty() {
            trace!("empty prompt for {persona}, rejected");
            return Submission::Rejected(RejectReason::EmptyPrompt);
        }

        let mut state = self.lock();
        if self.config.concurrency == ConcurrencyPolicy::GlobalSingleFlight
            && !state.reveals.is_empty()
        {
            debug!("a reveal is in flight, prompt for {persona} rejected");
            return Submission::Rejected(RejectReason::Busy);
        }
        if let Some(prior) = state.reveals.remove(&persona) {
            self.abort(persona, prior, "superseded");
        }

        let user_message = self.store.append(persona, NewMessage::user(prompt));
        let reply_message = self
            .store
            .append(persona, NewMessage::assistant_placeholder());
        let target = RevealTarget {
            persona,
            message_id: reply_message.id().clone(),
        };

        let reveal_id = state.next_reveal_id;
        state.next_reveal_id += 1;
        let cancel = CancellationToken::new();
        let task = self.spawn_reveal(reveal_id, target, prompt, cancel.clone());
        state.reveals.insert(
            persona,
            RevealSession {
                id: reveal_id,
                message_id: reply_message.id().clone(),
                cancel,
                task,
            },
        );
        self.set_busy(&state);

        Submission::Accepted {
            user_message: user_message.id().clone(),
            reply_message: reply_message.id().clone(),
        }
    }

    fn spawn_reveal(
        self: &Arc<Self>,
        reveal_id: u64,
        target: RevealTarget,
        prompt: &str,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let persona = persona::persona(target.persona);
        let req = AnswerRequest {
            persona: persona.id,
            system_prompt: persona.system_prompt.to_owned(),
            prompt: prompt.to_owned(),
        };
        let mode = self.config.answer_mode(persona.id);
        let span = debug_span!("reveal", persona = %persona.id, reveal_id);

        let shared = Arc::clone(self);
        tokio::spawn(
            async move {
                let answer = shared.client.request(req, mode);
                let outcome = shared
                    .engine
                    .reveal(answer, &target, persona.reveal_profile, &cancel)
                    .await;
                shared.finish_reveal(target.persona, reveal_id, outcome);
            }
            .instrument(span),
        )
    }

    fn finish_reveal(
        &self,
        persona: PersonaId,
        reveal_id: u64,
        outcome: RevealOutcome,
    ) {
        let became_idle = {
            let mut state = self.lock();
            if state.reveals.get(&persona).is_none_or(|r| r.id != reveal_id) {
                // Already superseded or cancelled.
                trace!("reveal {reveal_id} of {persona} ended: {outcome:?}");
                return;
            }
            state.reveals.remove(&persona);
            debug!("reveal {reveal_id} of {persona} ended: {outcome:?}");
            if let RevealOutcome::Recovered(reason) = outcome {
                state.last_error = Some(reason);
            }
            self.set_busy(&state)
        };
        if became_idle {
            self.notify_idle();
        }
    }

    pub(super) fn switch_persona(&self, persona: PersonaId) {
        let became_idle = {
            let mut state = self.lock();
            if state.active_persona == persona {
                return;
            }
            let previous = std::mem::replace(&mut state.active_persona, persona);
            info!("switching from {previous} to {persona}");

            let stale: Vec<_> = state
                .reveals
                .keys()
                .copied()
                .filter(|p| *p != persona)
                .collect();
            for p in stale {
                if let Some(reveal) = state.reveals.remove(&p) {
                    self.abort(p, reveal, "persona switched");
                }
            }
            if self.config.history == HistoryPolicy::WipeOnSwitch {
                self.store.clear(previous);
            }
            self.set_busy(&state)
        };
        if became_idle {
            self.notify_idle();
        }
    }

    pub(super) fn cancel(&self, persona: PersonaId) -> bool {
        let became_idle = {
            let mut state = self.lock();
            let Some(reveal) = state.reveals.remove(&persona) else {
                return false;
            };
            self.abort(persona, reveal, "stopped by user");
            self.set_busy(&state)
        };
        if became_idle {
            self.notify_idle();
        }
        true
    }

    pub(super) fn shutdown(&self) {
        let mut state = self.lock();
        for (persona, reveal) in state.reveals.drain() {
            reveal.task.abort();
            self.abort(persona, reveal, "session dropped");
        }
        self.busy_tx.send_replace(false);
    }

    fn abort(&self, persona: PersonaId, reveal: RevealSession, why: &str) {
        debug!("cancelling reveal {} of {persona}: {why}", reveal.id);
        reveal.cancel.cancel();
        // Mark it now, so nothing shows up between the cancellation and the
        // reveal task noticing it.
        self.store.mark_aborted(persona, &reveal.message_id, None);
    }

    /// Publishes the busy flag, returning `true` if the session just became
    /// idle. Called with the state locked, so that flags are published in
    /// the order the state changed.
    fn set_busy(&self, state: &SessionState) -> bool {
        let busy = !state.reveals.is_empty();
        let changed = self.busy_tx.send_if_modified(|current| {
            if *current == busy {
                return false;
            }
            *current = busy;
            true
        });
        changed && !busy
    }

    fn notify_idle(&self) {
        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }
    }
}
