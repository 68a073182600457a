//! Media sources.
//!
//! Search, metadata and downloads go through `yt-dlp`; see [`ytdlp`].

pub mod ytdlp;

pub use ytdlp::YtDlpResolver;
