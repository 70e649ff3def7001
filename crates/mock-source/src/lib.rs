//! Local answer sources that don't need a network.
//!
//! [`ScriptedSource`] is a deterministic double for tests, while
//! [`CannedSource`] makes up random persona-flavoured replies for offline
//! demos.

mod canned;
mod preset;

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use chatzoo_model::{
    AnswerRequest, AnswerSource, AnswerSourceError, CompleteAnswer, ErrorKind,
    FragmentStream, PersonaId,
};
use tokio::time::{Sleep, sleep};

pub use canned::*;
pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl AnswerSourceError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct ScriptedStream {
    events: VecDeque<PresetEvent>,
    delay: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
    finished: bool,
}

impl FragmentStream for ScriptedStream {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();
        if this.finished {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        if let Some(delay) = this.delay {
            let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
        }

        match this.events.pop_front() {
            Some(PresetEvent::Fragment(fragment)) => {
                Poll::Ready(Ok(Some(fragment)))
            }
            Some(PresetEvent::Fail(message)) => {
                this.finished = true;
                Poll::Ready(Err(Error::new(message, ErrorKind::Other)))
            }
            None => {
                this.finished = true;
                Poll::Ready(Ok(None))
            }
        }
    }
}

/// A scripted answer source for testing purpose.
///
/// Before sending requests, you need to set up the preset answer of every
/// persona you are going to talk to. Each request replays the preset of
/// its persona from the beginning. Asking a persona without a preset is an
/// error.
///
/// Clones share the attempt counters, so a test can keep a clone around to
/// inspect how many times a persona was asked.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    answers: HashMap<PersonaId, PresetAnswer>,
    delay: Option<Duration>,
    attempts: Arc<Mutex<HashMap<PersonaId, u64>>>,
}

impl ScriptedSource {
    #[inline]
    pub fn set_answer(&mut self, persona: PersonaId, preset: PresetAnswer) {
        self.answers.insert(persona, preset);
    }

    /// Sets the delay before every fragment, and before a complete answer.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns how many requests were made for `persona`.
    pub fn attempts(&self, persona: PersonaId) -> u64 {
        let attempts = self.attempts.lock().expect("attempts lock poisoned");
        attempts.get(&persona).copied().unwrap_or_default()
    }

    fn begin_attempt(
        &self,
        persona: PersonaId,
    ) -> Result<PresetAnswer, crate::Error> {
        let attempt = {
            let mut attempts =
                self.attempts.lock().expect("attempts lock poisoned");
            let attempt = attempts.entry(persona).or_default();
            *attempt += 1;
            *attempt
        };

        let Some(preset) = self.answers.get(&persona) else {
            return Err(Error::new(
                format!("no preset answer for {persona}"),
                ErrorKind::Other,
            ));
        };
        if preset.fails_on(attempt) {
            return Err(Error::new(
                format!("attempt {attempt} rejected"),
                ErrorKind::RateLimitExceeded,
            ));
        }
        Ok(preset.clone())
    }
}

impl Debug for ScriptedSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("personas", &self.answers.keys().collect::<Vec<_>>())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl AnswerSource for ScriptedSource {
    type Error = crate::Error;
    type Stream = ScriptedStream;

    fn respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<CompleteAnswer, Self::Error>> + Send + 'static
    {
        let preset = self.begin_attempt(req.persona);
        let delay = self.delay;
        async move {
            let preset = preset?;
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            preset
                .full_text()
                .map(CompleteAnswer::new)
                .map_err(|message| Error::new(message, ErrorKind::Other))
        }
    }

    fn stream_respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let delay = self.delay;
        let stream = self.begin_attempt(req.persona).map(|preset| {
            ScriptedStream {
                events: preset.events.into(),
                delay,
                sleep: None,
                finished: false,
            }
        });
        std::future::ready(stream)
    }
}
