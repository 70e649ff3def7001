use std::pin::Pin;
use std::task::{self, Poll};

use crate::source::AnswerSourceError;

/// An answer being delivered fragment by fragment.
pub trait FragmentStream: Sized + Send + 'static {
    /// The error type that may be returned by the source.
    type Error: AnswerSourceError;

    /// Attempts to pull out the next fragment of the answer.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct stream state:
    ///
    /// - `Poll::Pending` means that this stream is still waiting for the
    ///   next fragment. Implementations will ensure that the current task
    ///   will be notified when the next fragment may be ready.
    /// - `Poll::Ready(Ok(Some(fragment)))` means the stream has a fragment
    ///   to deliver, and may produce further fragments on subsequent
    ///   `poll_next_fragment` calls.
    /// - `Poll::Ready(Ok(None))` means the answer has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while receiving
    ///   the answer.
    ///
    /// Fragments have source-determined granularity, they may be single
    /// characters, words or whole sentences. Calling this method after
    /// completion should always return `None`.
    fn poll_next_fragment(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<String>, Self::Error>>;
}
