use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use chatzoo_model::{
    AnswerRequest, AnswerSource, AnswerSourceError, FragmentStream,
};
use tokio::time::sleep;
use tracing::Instrument;

use crate::config::RetryPolicy;
use crate::persona::AnswerMode;

/// A type-erased answer source error.
pub type BoxError = Box<dyn AnswerSourceError>;

type AnswerFuture = Pin<Box<dyn Future<Output = Result<Answer, BoxError>> + Send>>;
type HandlerFn = Arc<dyn Fn(AnswerRequest, AnswerMode) -> AnswerFuture + Send + Sync>;

/// What an answer source handed back.
pub enum Answer {
    Complete(String),
    Fragments(Fragments),
}

trait ErasedStream: Send {
    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, BoxError>>;
}

impl<S: FragmentStream> ErasedStream for S {
    #[inline]
    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, BoxError>> {
        self.poll_next_fragment(cx)
            .map_err(|err| Box::new(err) as BoxError)
    }
}

/// A type-erased fragment stream.
pub struct Fragments(Pin<Box<dyn ErasedStream>>);

impl Fragments {
    #[inline]
    pub fn new<S: FragmentStream>(stream: S) -> Self {
        Self(Box::pin(stream))
    }

    /// Receives the next fragment, `None` once the answer is complete.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe as long as the underlying stream keeps
    /// its progress between polls, which [`FragmentStream`] requires.
    #[inline]
    pub async fn next(&mut self) -> Result<Option<String>, BoxError> {
        poll_fn(|cx| self.0.as_mut().poll_next(cx)).await
    }
}

/// A wrapper around an answer source that provides a type-erased interface
/// for the other modules, and retries rate-limited requests.
#[derive(Clone)]
pub struct AnswerClient {
    handler_fn: HandlerFn,
    retry: RetryPolicy,
}

impl AnswerClient {
    #[inline]
    pub fn new<S: AnswerSource + 'static>(source: S) -> Self {
        // We have to erase the type `S`, since `AnswerClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, mode| {
            let span = trace_span!("answer client req", persona = %req.persona);
            match mode {
                AnswerMode::Complete => {
                    let fut = source.respond(&req);
                    Box::pin(
                        async move {
                            let answer = fut.await.map_err(box_error)?;
                            Ok(Answer::Complete(answer.text))
                        }
                        .instrument(span),
                    )
                }
                AnswerMode::Streaming => {
                    let fut = source.stream_respond(&req);
                    Box::pin(
                        async move {
                            let stream = fut.await.map_err(box_error)?;
                            Ok(Answer::Fragments(Fragments::new(stream)))
                        }
                        .instrument(span),
                    )
                }
            }
        });
        Self {
            handler_fn,
            retry: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends a request and returns the answer, once the source accepted it.
    ///
    /// Transient failures are retried with an exponential backoff, as
    /// configured by the retry policy.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. Pending retries are dropped when this
    /// operation is cancelled.
    pub async fn request(
        &self,
        req: AnswerRequest,
        mode: AnswerMode,
    ) -> Result<Answer, BoxError> {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry.initial_interval)
            .with_max_elapsed_time(None)
            .build();
        let mut retries = 0;
        loop {
            trace!("sending a {mode:?} request: {req:?}");
            let err = match (self.handler_fn)(req.clone(), mode).await {
                Ok(answer) => return Ok(answer),
                Err(err) => err,
            };
            if !err.kind().is_transient() || retries >= self.retry.max_retries {
                error!("got an error: {err}");
                return Err(err);
            }
            retries += 1;
            let delay = backoff
                .next_backoff()
                .unwrap_or(self.retry.initial_interval);
            warn!(
                "got a transient error: {err}, retry {retries}/{} in {delay:?}",
                self.retry.max_retries
            );
            sleep(delay).await;
        }
    }
}

#[inline]
fn box_error<E: AnswerSourceError>(err: E) -> BoxError {
    Box::new(err)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chatzoo_mock_source::{PresetAnswer, ScriptedSource};
    use chatzoo_model::{ErrorKind, PersonaId};

    use super::*;

    fn request(persona: PersonaId) -> AnswerRequest {
        AnswerRequest {
            persona,
            system_prompt: String::new(),
            prompt: "Hi".to_owned(),
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_complete_and_streaming() {
        let mut source = ScriptedSource::default();
        source.set_answer(
            PersonaId::Sloth,
            PresetAnswer::with_fragments(["How ", "are ", "you?"]),
        );
        let client = AnswerClient::new(source);

        let answer = client
            .request(request(PersonaId::Sloth), AnswerMode::Complete)
            .await
            .unwrap();
        assert!(matches!(answer, Answer::Complete(text) if text == "How are you?"));

        let answer = client
            .request(request(PersonaId::Sloth), AnswerMode::Streaming)
            .await
            .unwrap();
        let Answer::Fragments(mut fragments) = answer else {
            panic!("expected a fragment stream");
        };
        let mut received = Vec::new();
        while let Some(fragment) = fragments.next().await.unwrap() {
            received.push(fragment);
        }
        assert_eq!(received, ["How ", "are ", "you?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_errors() {
        let mut source = ScriptedSource::default();
        source.set_answer(
            PersonaId::Cat,
            PresetAnswer::with_fragments(["Meow"]).with_failures(2),
        );
        let observer = source.clone();
        let client = AnswerClient::new(source).with_retry(fast_retry(2));

        let answer = client
            .request(request(PersonaId::Cat), AnswerMode::Complete)
            .await
            .unwrap();
        assert!(matches!(answer, Answer::Complete(text) if text == "Meow"));
        assert_eq!(observer.attempts(PersonaId::Cat), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_give_up_after_max_retries() {
        let mut source = ScriptedSource::default();
        source.set_answer(
            PersonaId::Cat,
            PresetAnswer::with_fragments(["Meow"]).with_failures(0),
        );
        let observer = source.clone();
        let client = AnswerClient::new(source).with_retry(fast_retry(2));

        let Err(err) = client
            .request(request(PersonaId::Cat), AnswerMode::Streaming)
            .await
        else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(observer.attempts(PersonaId::Cat), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let source = ScriptedSource::default();
        let observer = source.clone();
        let client = AnswerClient::new(source).with_retry(fast_retry(5));

        let result = client
            .request(request(PersonaId::Goldfish), AnswerMode::Complete)
            .await;
        assert!(matches!(result, Err(err) if err.kind() == ErrorKind::Other));
        assert_eq!(observer.attempts(PersonaId::Goldfish), 1);
    }
}
