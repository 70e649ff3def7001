//! The reveal engine, which turns answers into a sequence of growing
//! message texts.
//!
//! A reveal writes into exactly one placeholder message. Every write
//! extends the text that was written before, and the message is finished
//! exactly once: complete when the answer is exhausted, aborted when the
//! reveal is cancelled, or complete with the fallback text when the
//! answer source fails.

use std::time::Duration;

use chatzoo_model::PersonaId;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::answer_client::{Answer, BoxError};
use crate::config::{FALLBACK_TEXT, PacingPolicy};
use crate::persona::RevealProfile;
use crate::store::{ConversationStore, MessageId};

/// The message a reveal writes into.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RevealTarget {
    pub persona: PersonaId,
    pub message_id: MessageId,
}

/// How a reveal ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    /// The whole answer was revealed.
    Completed,
    /// The reveal was cancelled, or its message was finished by someone
    /// else. The text revealed so far is kept.
    Cancelled,
    /// The answer source failed and the fallback text was shown instead.
    Recovered(String),
}

enum Interrupt {
    Cancelled,
    Failed(String),
}

/// Reveals answers into the messages of a conversation store.
#[derive(Clone)]
pub struct RevealEngine {
    store: ConversationStore,
    pacing: PacingPolicy,
    fallback_text: String,
    source_timeout: Option<Duration>,
}

impl RevealEngine {
    #[inline]
    pub fn new(store: ConversationStore, pacing: PacingPolicy) -> Self {
        Self {
            store,
            pacing,
            fallback_text: FALLBACK_TEXT.to_owned(),
            source_timeout: None,
        }
    }

    #[inline]
    pub fn with_fallback_text<S: Into<String>>(mut self, text: S) -> Self {
        self.fallback_text = text.into();
        self
    }

    /// Sets the longest wait for the answer, and for each of its fragments.
    #[inline]
    pub fn with_source_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Reveals the answer resolved by `answer` into the target message.
    ///
    /// Paced reveals wait one pacing delay before every unit of text: a
    /// character of a complete answer, or a fragment of a streamed one.
    /// Instant reveals write every unit as soon as it is available.
    ///
    /// Once `cancel` is triggered nothing is written anymore, and the
    /// message is marked as aborted unless it was already finished.
    pub async fn reveal<F>(
        &self,
        answer: F,
        target: &RevealTarget,
        profile: RevealProfile,
        cancel: &CancellationToken,
    ) -> RevealOutcome
    where
        F: Future<Output = Result<Answer, BoxError>>,
    {
        let RevealTarget {
            persona,
            message_id,
        } = target;
        debug!("revealing message {message_id} of {persona} ({profile:?})");

        match self.run(answer, target, profile, cancel).await {
            Ok(()) => {
                if self.store.mark_complete(*persona, message_id) {
                    debug!("message {message_id} completed");
                    RevealOutcome::Completed
                } else {
                    RevealOutcome::Cancelled
                }
            }
            Err(Interrupt::Cancelled) => {
                self.store.mark_aborted(*persona, message_id, None);
                debug!("reveal of message {message_id} cancelled");
                RevealOutcome::Cancelled
            }
            Err(Interrupt::Failed(reason)) => {
                if cancel.is_cancelled() {
                    self.store.mark_aborted(*persona, message_id, None);
                    return RevealOutcome::Cancelled;
                }
                warn!("answer for message {message_id} failed: {reason}");
                if self.store.complete_with_fallback(
                    *persona,
                    message_id,
                    &self.fallback_text,
                ) {
                    RevealOutcome::Recovered(reason)
                } else {
                    RevealOutcome::Cancelled
                }
            }
        }
    }

    async fn run<F>(
        &self,
        answer: F,
        target: &RevealTarget,
        profile: RevealProfile,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt>
    where
        F: Future<Output = Result<Answer, BoxError>>,
    {
        let answer = self
            .wait_source(cancel, answer)
            .await?
            .map_err(|err| Interrupt::Failed(err.to_string()))?;

        let mut revealed = String::new();
        match answer {
            Answer::Complete(text) => match profile {
                RevealProfile::Instant => {
                    self.write(target, cancel, &mut revealed, &text)?;
                }
                RevealProfile::Paced => {
                    let mut buf = [0; 4];
                    for unit in text.chars() {
                        self.pause(cancel).await?;
                        let unit = unit.encode_utf8(&mut buf);
                        self.write(target, cancel, &mut revealed, unit)?;
                    }
                }
            },
            Answer::Fragments(mut fragments) => loop {
                let fragment = match self
                    .wait_source(cancel, fragments.next())
                    .await?
                {
                    Ok(Some(fragment)) => fragment,
                    Ok(None) => break,
                    Err(err) => return Err(Interrupt::Failed(err.to_string())),
                };
                if fragment.is_empty() {
                    continue;
                }
                if profile == RevealProfile::Paced {
                    self.pause(cancel).await?;
                }
                self.write(target, cancel, &mut revealed, &fragment)?;
            },
        }
        Ok(())
    }

    fn write(
        &self,
        target: &RevealTarget,
        cancel: &CancellationToken,
        revealed: &mut String,
        unit: &str,
    ) -> Result<(), Interrupt> {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        revealed.push_str(unit);
        trace!("message {} grows to {} bytes", target.message_id, revealed.len());
        if self.store.update_text(
            target.persona,
            &target.message_id,
            revealed.as_str(),
        ) {
            Ok(())
        } else {
            // The message was finished behind our back, e.g. its
            // conversation was cleared.
            Err(Interrupt::Cancelled)
        }
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<(), Interrupt> {
        let delay = self.pacing.next_delay();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    }

    async fn wait_source<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = T>,
    ) -> Result<T, Interrupt> {
        let fut = async {
            match self.source_timeout {
                Some(duration) => timeout(duration, fut).await.map_err(|_| {
                    Interrupt::Failed(format!(
                        "no answer within {duration:?}"
                    ))
                }),
                None => Ok(fut.await),
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            result = fut => result,
        }
    }
}
