//! # UI Module
//!
//! User-facing text and Discord embeds.
//!
//! - [`captions`] - transport-neutral captions for every player outcome
//! - [`embeds`] - Discord rendering of media notifications

pub mod captions;
pub mod embeds;
