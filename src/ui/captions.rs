//! Text rendered into chat messages.

use std::time::Duration;

use crate::{
    audio::queue::QueueEntry,
    transport::{ChatId, Notification},
};

pub const DEFAULT_THUMBNAIL: &str = "https://i.ytimg.com/vi/default.jpg";

pub const VOICE_CHAT_ENDED: &str = "Voice chat ended...";
pub const QUEUE_EMPTY_LEAVING: &str = "Queue is empty, leaving voice chat...";
pub const ERROR_LEAVING: &str = "An error occurred, leaving voice chat...";
pub const SKIP_QUEUE_EMPTY: &str = "Queue is empty, voice chat ended...";
pub const SKIP_ERROR: &str = "An error occurred, ending voice chat...";
pub const QUEUE_EMPTY: &str = "Queue is empty!";
pub const CHAT_UNAVAILABLE: &str = "Cannot access this chat!";
pub const ADMIN_ONLY: &str = "❌ Only chat admins can use this command!";
pub const NO_ACTIVE_PLAYBACK: &str = "No active playback in this chat!";
pub const PAUSED: &str = "⏸ Playback paused!";
pub const PAUSE_FAILED: &str = "❌ Failed to pause playback!";
pub const RESUMED: &str = "▶️ Playback resumed!";
pub const RESUME_FAILED: &str = "❌ Failed to resume playback!";
pub const STOPPED: &str = "⏹ Playback stopped and queue cleared!";
pub const PLAY_USAGE: &str = "Reply with an audio file or provide a search query!";
pub const NO_RESULTS: &str = "No results found!";
pub const DOWNLOAD_FAILED: &str = "**Download Error ⚠️**\n`Song download failed!`";
pub const PLAYBACK_FAILED: &str = "**Error ⚠️**\n`Playback failed to start, try again!`";

/// Cuts a title at the first `#`, `|`, `-`, `,` or `.`.
///
/// Falls back to the trimmed full title when the cut leaves nothing.
pub fn shorten_title(title: &str) -> String {
    let short = title
        .split(|c: char| matches!(c, '#' | '|' | '-' | ',' | '.'))
        .next()
        .unwrap_or_default()
        .trim();

    if short.is_empty() {
        title.trim().to_string()
    } else {
        short.to_string()
    }
}

/// `m:ss`, or `h:mm:ss` past the hour.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn link(entry: &QueueEntry) -> &str {
    entry.url().unwrap_or("No Link")
}

fn thumbnail(entry: &QueueEntry) -> String {
    entry.thumbnail().unwrap_or(DEFAULT_THUMBNAIL).to_string()
}

/// Announcement for a track that started right after `play`.
pub fn now_playing(entry: &QueueEntry) -> Notification {
    match entry.url() {
        Some(url) => {
            let caption = format!(
                "⏰ Vibe Time: {}\n🎶 Vibe: [{}]({})\n👤 Proposed by: {}",
                entry.duration_label().unwrap_or("??"),
                shorten_title(entry.title()),
                url,
                entry.requester()
            );
            Notification::media(thumbnail(entry), caption)
        }
        // Uploaded media has no link or artwork.
        None => Notification::text(format!(
            "Duration {}\n🎶 Vibe [{}]({}) | `{}`\n👤 Proposed by: {}",
            entry.duration_label().unwrap_or("??"),
            shorten_title(entry.title()),
            link(entry),
            entry.media_kind(),
            entry.requester()
        )),
    }
}

pub fn queued(entry: &QueueEntry, position: usize) -> Notification {
    Notification::text(format!(
        "**Queued at #{}**\n🎶 Vibe: [{}]({})\n👤 Proposed by: {}",
        position,
        shorten_title(entry.title()),
        link(entry),
        entry.requester()
    ))
}

/// Announcement for a track started by the end of the previous one.
pub fn auto_played(entry: &QueueEntry) -> Notification {
    let caption = format!(
        "⏰ Vibe Time: {}\n🎶 Vibe: [{}]({})\n👤 Proposed by: {}\n👤 Auto Played",
        entry.duration_label().unwrap_or("??"),
        shorten_title(entry.title()),
        link(entry),
        entry.requester()
    );
    Notification::media(thumbnail(entry), caption)
}

pub fn skipped(entry: &QueueEntry, skipper: &str, queued: usize) -> Notification {
    let caption = format!(
        "⏰ Vibe Time: {}\n🎶 Now Playing: `\"{}\" proposed by \"{}\"`\n👤 Skipped by: {}\nTotal Songs in Queue: {}",
        entry.duration_label().unwrap_or("----"),
        shorten_title(entry.title()),
        entry.requester(),
        skipper,
        queued
    );
    Notification::media(thumbnail(entry), caption)
}

pub fn queue_listing(entries: &[QueueEntry]) -> String {
    if entries.is_empty() {
        return QUEUE_EMPTY.to_string();
    }

    let mut text = String::from("Current Queue:\n");
    for (i, entry) in entries.iter().enumerate() {
        text.push_str(&format!(
            "{}. `\"{}\" proposed by \"{}\"` - [Link]({})\n",
            i + 1,
            shorten_title(entry.title()),
            entry.requester(),
            link(entry)
        ));
    }
    text
}

pub fn queue_full(max: usize) -> String {
    format!("Queue is full (max {} songs)! Skip older songs first.", max)
}

pub fn already_active(channels: &[ChatId]) -> String {
    let list = channels
        .iter()
        .map(|chat| chat.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You can only play in one chat at a time! Your songs are currently playing or queued in chats: {}",
        list
    )
}

pub fn processing_error(what: &str, error: &dyn std::fmt::Display) -> String {
    format!("**Error ⚠️**\n`Error processing {}: {}`", what, error)
}

pub fn restriction_status(enabled: bool) -> String {
    let status = if enabled { "enabled" } else { "disabled" };
    format!("Multiple chat restriction is now {}", status)
}
