//! An answer source for OpenAI-compatible chat completion APIs.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use chatzoo_model::{
    AnswerRequest, AnswerSource, AnswerSourceError, CompleteAnswer, ErrorKind,
};
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
use proto::ChatCompletion;
pub use response::OpenAIStream;

/// Error type for [`OpenAISource`].
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

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            ErrorKind::RateLimitExceeded
        } else if err.is_decode() {
            ErrorKind::MalformedPayload
        } else {
            ErrorKind::Other
        };
        Self::new(format!("{err}"), kind)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl AnswerSourceError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible answer source.
///
/// The persona's system prompt is sent as the system message, followed by
/// the user prompt. No history is sent, every answer starts afresh.
#[derive(Clone, Debug)]
pub struct OpenAISource {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAISource {
    /// Creates a new `OpenAISource` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn post(&self, req: &AnswerRequest, stream: bool) -> RequestBuilder {
        let body = proto::create_request(req, &self.config, stream);
        trace!("posting a request for {}: {body:?}", req.persona);
        self.client
            .post(self.config.completions_url())
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
    }
}

impl AnswerSource for OpenAISource {
    type Error = Error;
    type Stream = OpenAIStream;

    fn respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<CompleteAnswer, Self::Error>> + Send + 'static
    {
        let resp_fut = self
            .post(req, false)
            .header(header::ACCEPT, "application/json")
            .timeout(self.config.timeout)
            .send();

        async move {
            let resp = resp_fut
                .await
                .and_then(Response::error_for_status)
                .map_err(Error::from_reqwest)?;
            let completion: ChatCompletion =
                resp.json().await.map_err(Error::from_reqwest)?;
            let text = completion
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| {
                    Error::new(
                        "completion has no content",
                        ErrorKind::MalformedPayload,
                    )
                })?;
            Ok(CompleteAnswer::new(text))
        }
    }

    fn stream_respond(
        &self,
        req: &AnswerRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let resp_fut = self
            .post(req, true)
            .header(header::ACCEPT, "text/event-stream")
            .send();
        let timeout = self.config.timeout;

        async move {
            let Ok(resp) = tokio::time::timeout(timeout, resp_fut).await else {
                return Err(Error::new(
                    format!("no response within {timeout:?}"),
                    ErrorKind::Timeout,
                ));
            };
            let resp = resp
                .and_then(Response::error_for_status)
                .map_err(Error::from_reqwest)?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::MalformedPayload,
                ));
            }

            // Here we got a successful response.
            let sse = Sse::new(Chunks::from_response(resp));
            Ok(OpenAIStream::from_sse(sse))
        }
    }
}
