//! The protocol between ChatZoo and whatever produces the answers.
//!
//! This crate establishes a unified contract for answer sources, so that
//! the chat session can seamlessly switch between a real model backend,
//! a canned offline generator, or a scripted test double without
//! modifying the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod persona;
mod request;
mod source;
mod stream;

pub use error::*;
pub use persona::*;
pub use request::*;
pub use source::*;
pub use stream::*;
