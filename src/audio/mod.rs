//! # Audio Module
//!
//! Playback session core for Vibe Queue.
//!
//! Every chat gets its own queue and its own voice session; nothing here
//! serializes work across chats.
//!
//! ## Architecture
//!
//! The module is built from four pieces, leaves first:
//!
//! ### [`files`] - File Tracker
//! - Reference counts for downloaded media files
//! - Background deletion with a bounded retry budget once a file is unused
//!
//! ### [`queue`] - Queue Store
//! - One bounded FIFO per chat, each behind its own async lock
//! - Lazy creation on first enqueue, removal when the session ends
//!
//! ### [`activity`] - Activity Index
//! - Which chats each user currently has songs in
//! - Backs the optional "one chat per user" restriction
//!
//! ### [`player`] - Session Orchestrator
//! - Starts playback, advances on track end or skip, pauses and resumes
//! - Tears sessions down on empty queues, playback errors and `/end`
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let player = AudioPlayer::new(PlayerSettings::default(), chat, stream);
//! let entry = QueueEntry::new("Song", "/downloads/abc.m4a", "Ana", UserId(1));
//!
//! match player.enqueue_request(ChatId(42), entry).await? {
//!     EnqueueOutcome::Started { entry } => println!("playing {}", entry.title()),
//!     EnqueueOutcome::Queued { position } => println!("queued at #{}", position),
//! }
//!
//! // Raised by the streaming transport when a track finishes
//! let outcome = player.advance(ChatId(42)).await?;
//! ```

pub mod activity;
pub mod files;
pub mod player;
pub mod queue;
