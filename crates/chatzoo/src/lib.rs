//! An out-of-the-box ChatZoo, wiring the personas to a real or a canned
//! answer source.
//!
//! The crate includes a CLI tool for chatting in the terminal. The pieces it
//! is made of, like reading settings from the environment and parsing chat
//! commands, are exposed for other front-ends.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod command;
mod export;
mod settings;

pub use command::Command;
pub use export::{ConversationExport, export_conversation};
pub use settings::{Settings, SettingsError, SourceSettings};

/// Re-exports of [`chatzoo_core`] crate.
pub mod core {
    pub use chatzoo_core::*;
}
