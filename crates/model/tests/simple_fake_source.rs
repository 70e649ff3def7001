use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use chatzoo_model::{
    AnswerRequest, AnswerSource, AnswerSourceError, CompleteAnswer, ErrorKind,
    FragmentStream, PersonaId,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoError {}

impl AnswerSourceError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct EchoStream {
    words: VecDeque<String>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl EchoStream {
    fn new(input: &str) -> Self {
        let words = echo(input).split(' ').map(ToString::to_string).collect();
        Self { words, sleep: None }
    }
}

impl FragmentStream for EchoStream {
    type Error = EchoError;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            return match this.words.pop_front() {
                Some(mut word) => {
                    if !this.words.is_empty() {
                        word.push(' ');
                    }
                    Poll::Ready(Ok(Some(word)))
                }
                None => Poll::Ready(Ok(None)),
            };
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_fragment(cx)
    }
}

fn echo(input: &str) -> String {
    format!("You said {input}")
}

/// Repeats the prompt back, refusing to talk to cats.
struct EchoSource;

impl AnswerSource for EchoSource {
    type Error = EchoError;
    type Stream = EchoStream;

    fn respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<CompleteAnswer, Self::Error>> + Send + 'static
    {
        let result = if req.persona == PersonaId::Cat {
            Err(EchoError(ErrorKind::Other))
        } else {
            Ok(CompleteAnswer::new(echo(&req.prompt)))
        };
        ready(result)
    }

    fn stream_respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let result = if req.persona == PersonaId::Cat {
            Err(EchoError(ErrorKind::Other))
        } else {
            Ok(EchoStream::new(&req.prompt))
        };
        ready(result)
    }
}

fn request(persona: PersonaId, prompt: &str) -> AnswerRequest {
    AnswerRequest {
        persona,
        system_prompt: String::new(),
        prompt: prompt.to_owned(),
    }
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_respond() {
        let source = EchoSource;
        let mut stream = source
            .stream_respond(&request(PersonaId::Sloth, "Good morning"))
            .await
            .unwrap();

        let mut fragments = Vec::new();
        loop {
            let next =
                poll_fn(|cx| Pin::new(&mut stream).poll_next_fragment(cx));
            match next.await {
                Ok(Some(fragment)) => fragments.push(fragment),
                Ok(None) => break,
                Err(err) => unreachable!("unexpected error: {err:?}"),
            }
        }

        assert_eq!(fragments, ["You ", "said ", "Good ", "morning"]);
        assert_eq!(fragments.concat(), "You said Good morning");
    }

    #[tokio::test]
    async fn test_respond() {
        let answer = EchoSource
            .respond(&request(PersonaId::Goldfish, "hi"))
            .await
            .unwrap();
        assert_eq!(answer.text, "You said hi");
    }

    #[tokio::test]
    async fn test_error() {
        let source = EchoSource;
        let err = source
            .stream_respond(&request(PersonaId::Cat, "hi"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(!err.kind().is_transient());
    }
}
