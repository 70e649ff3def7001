use std::time::Duration;

use chatzoo_model::{AnswerSource, PersonaId};

use super::Session;
use crate::answer_client::AnswerClient;
use crate::config::{
    ConcurrencyPolicy, HistoryPolicy, PacingPolicy, RetryPolicy, SessionConfig,
};
use crate::persona::AnswerMode;

/// [`Session`] builder.
pub struct SessionBuilder {
    pub(crate) client: AnswerClient,
    pub(crate) config: SessionConfig,
    pub(crate) initial_persona: PersonaId,
    pub(crate) on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

impl SessionBuilder {
    /// Creates a new builder with the specified answer source.
    #[inline]
    pub fn with_answer_source<S: AnswerSource + 'static>(source: S) -> Self {
        Self {
            client: AnswerClient::new(source),
            config: SessionConfig::default(),
            initial_persona: PersonaId::Cat,
            on_idle: None,
        }
    }

    /// Replaces the whole configuration.
    #[inline]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.config.pacing = pacing;
        self
    }

    #[inline]
    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.config.concurrency = policy;
        self
    }

    #[inline]
    pub fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.config.history = policy;
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Sets the text shown in place of a reply when the source fails.
    #[inline]
    pub fn with_fallback_text<S: Into<String>>(mut self, text: S) -> Self {
        self.config.fallback_text = text.into();
        self
    }

    #[inline]
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.config.source_timeout = Some(timeout);
        self
    }

    /// Overrides how `persona` asks the answer source.
    #[inline]
    pub fn with_answer_mode(mut self, persona: PersonaId, mode: AnswerMode) -> Self {
        self.config.answer_modes.insert(persona, mode);
        self
    }

    /// Sets the persona that is active when the session starts.
    #[inline]
    pub fn with_initial_persona(mut self, persona: PersonaId) -> Self {
        self.initial_persona = persona;
        self
    }

    /// Attaches a callback to be invoked when the session becomes idle.
    ///
    /// The callback runs on the task that finished the last reveal, so it
    /// must not block.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the session.
    #[inline]
    pub fn build(self) -> Session {
        Session::from_builder(self)
    }
}
