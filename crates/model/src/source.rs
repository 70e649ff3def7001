use std::error::Error;

use crate::error::ErrorKind;
use crate::request::{AnswerRequest, CompleteAnswer};
use crate::stream::FragmentStream;

/// The error type for an answer source.
pub trait AnswerSourceError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that produces answers for the personas, either in one shot or
/// as a sequence of text fragments.
///
/// Once the source is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the source should be prepared for being dropped anytime.
pub trait AnswerSource: Send + Sync {
    /// The error type that may be returned by the source.
    type Error: AnswerSourceError;

    /// The fragment stream type for this source.
    type Stream: FragmentStream<Error = Self::Error>;

    /// Asks for a complete answer.
    fn respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<CompleteAnswer, Self::Error>> + Send + 'static;

    /// Asks for an answer delivered as incremental fragments.
    ///
    /// The returned future resolves once the source has accepted the
    /// request. Failures after that point are reported by the stream.
    fn stream_respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static;
}
