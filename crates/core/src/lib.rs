//! Core logic of ChatZoo: the persona registry, the conversation store, the
//! reveal engine and the session controller tying them together.

#[macro_use]
extern crate tracing;

mod answer_client;
pub mod config;
pub mod persona;
pub mod reveal;
mod session;
pub mod store;

pub use answer_client::{Answer, AnswerClient, BoxError, Fragments};
pub use config::{
    ConcurrencyPolicy, HistoryPolicy, PacingPolicy, RetryPolicy, SessionConfig,
};
pub use persona::{AnswerMode, Persona, RevealProfile};
pub use session::{RejectReason, Session, SessionBuilder, Submission};
