use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chatzoo_model::{
    AnswerRequest, AnswerSource, CompleteAnswer, FragmentStream, PersonaId,
};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::time::sleep;

const MEOW_SUFFIXES: &[&str] = &["", "!", "~", "?"];
const CAT_EMOJIS: &[&str] =
    &["😺", "😸", "😹", "😻", "😼", "😽", "🙀", "😿", "😾", "🐾"];

const GOLDFISH_REPLIES: &[&str] = &[
    "Oh, hi there! Nice to meet you! 🐠",
    "Wait... what were we talking about? 🐠",
    "I forget... but it sounded important! 🐠",
    "Hello! Is this the first time we talk? It feels like it! 🐠",
    "Ooh, bubbles! Sorry, what did you say? 🐠",
];

const SLOTH_REPLIES: &[&str] = &[
    "I... a... m... f... i... n... e... 🦥",
    "Why... hurry...? The... leaves... will... wait... 🦥",
    "Hmm...... let... me... think...... about... that... 🦥",
    "Slow... and... steady... 🦥",
];

/// An answer source that makes up replies locally.
///
/// The cat meows once per word of the prompt (up to five times), the
/// goldfish greets you as if you just met, and the sloth drawls. Streamed
/// answers are delivered one character per fragment, pacing is left to
/// the caller.
#[derive(Clone, Debug, Default)]
pub struct CannedSource {
    latency: Option<Duration>,
}

impl CannedSource {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a network round trip before every answer.
    #[inline]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes up a reply for the request.
    pub fn compose(&self, req: &AnswerRequest) -> String {
        let mut rng = rand::thread_rng();
        match req.persona {
            PersonaId::Cat => {
                let words = req.prompt.split_whitespace().count().clamp(1, 5);
                let mut reply: Vec<String> = (0..words)
                    .map(|_| {
                        let suffix =
                            MEOW_SUFFIXES.choose(&mut rng).unwrap_or(&"");
                        format!("meow{suffix}")
                    })
                    .collect();
                if let Some(first) = reply.first_mut() {
                    *first = capitalize(first);
                }
                let emoji = CAT_EMOJIS[rng.gen_range(0..CAT_EMOJIS.len())];
                reply.push(emoji.to_owned());
                reply.join(" ")
            }
            PersonaId::Goldfish => pick(&mut rng, GOLDFISH_REPLIES),
            PersonaId::Sloth => pick(&mut rng, SLOTH_REPLIES),
        }
    }
}

fn pick<R: Rng>(rng: &mut R, replies: &[&str]) -> String {
    replies.choose(rng).copied().unwrap_or_default().to_owned()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Delivers a canned reply one character at a time.
pub struct CannedStream {
    chars: VecDeque<char>,
}

impl FragmentStream for CannedStream {
    type Error = crate::Error;

    fn poll_next_fragment(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>> {
        let this = self.get_mut();
        Poll::Ready(Ok(this.chars.pop_front().map(String::from)))
    }
}

impl AnswerSource for CannedSource {
    type Error = crate::Error;
    type Stream = CannedStream;

    fn respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<CompleteAnswer, Self::Error>> + Send + 'static
    {
        let text = self.compose(req);
        let latency = self.latency;
        async move {
            if let Some(latency) = latency {
                sleep(latency).await;
            }
            Ok(CompleteAnswer::new(text))
        }
    }

    fn stream_respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let chars = self.compose(req).chars().collect();
        let latency = self.latency;
        async move {
            if let Some(latency) = latency {
                sleep(latency).await;
            }
            Ok(CannedStream { chars })
        }
    }
}
