use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chatzoo_model::{ErrorKind, FragmentStream};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::ChatCompletionChunk;

struct StreamState {
    sse: Sse,
    // Set once a chunk carries a finish reason, the remaining events
    // (usage, `[DONE]`) are not read.
    finished: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextFragment = Result<(Option<String>, StreamState), Error>;

pin_project! {
    pub struct OpenAIStream {
        next_fragment_fut: Option<PinnedFuture<NextFragment>>,
    }
}

impl OpenAIStream {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let state = StreamState {
            sse,
            finished: false,
        };
        Self {
            next_fragment_fut: Some(Box::pin(next_fragment(state))),
        }
    }
}

impl FragmentStream for OpenAIStream {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.project();
        let Some(next_fragment_fut) = this.next_fragment_fut else {
            return Poll::Ready(Ok(None));
        };
        match ready!(next_fragment_fut.as_mut().poll(cx)) {
            Ok((Some(fragment), state)) => {
                // The stream may still have more data to pull, create a new
                // future for the next fragment.
                *this.next_fragment_fut = Some(Box::pin(next_fragment(state)));
                Poll::Ready(Ok(Some(fragment)))
            }
            Ok((None, _)) => {
                *this.next_fragment_fut = None;
                Poll::Ready(Ok(None))
            }
            Err(err) => {
                *this.next_fragment_fut = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

async fn next_fragment(mut state: StreamState) -> NextFragment {
    if state.finished {
        return Ok((None, state));
    }

    loop {
        let sse_event = match state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok((None, state)),
            Err(SseError::InvalidPayload) => {
                return Err(Error::new(
                    "invalid event stream payload",
                    ErrorKind::MalformedPayload,
                ));
            }
            Err(SseError::Chunks(err)) => {
                return Err(Error::new(err.0, ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            return Ok((None, state));
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::MalformedPayload)
            })?;
        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };

        if choice.finish_reason.is_some() {
            state.finished = true;
        }
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                return Ok((Some(content), state));
            }
        }
        if state.finished {
            return Ok((None, state));
        }
    }
}
