//! Dubro - Video Dubbing Pipeline
//!
//! Extracts speech from a video, transcribes and translates it, pauses for a
//! human review of the translated subtitles, then synthesizes the dubbed
//! track and muxes it back onto the video using whisper-cpp, ollama, a TTS
//! engine and ffmpeg.

pub mod cli;
pub mod config;
pub mod error;
pub mod language;
pub mod media;
pub mod pipeline;
pub mod service;
pub mod subtitle;
pub mod synthesize;
pub mod transcribe;
pub mod translate;
pub mod workspace;
