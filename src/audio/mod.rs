//! # Audio Pacing Module
//!
//! Turns raw PCM bytes arriving in irregular bursts into fixed-size frames delivered
//! at real-time cadence.
//!
//! ## Key Components:
//! - **Format**: PCM layout and the byte sizes derived from it
//! - **Frame**: emitted frames and the sink trait that consumes them
//! - **Rechunker**: segment queue, frame slicing and self-rearming timer state
//! - **Pacer**: tokio task that serializes writes with timer firings
//!
//! ## Default Audio Format:
//! - **Sample Rate**: 48kHz
//! - **Bit Depth**: 16-bit PCM, little-endian
//! - **Channels**: Mono
//! - **Frame**: 10 ms (960 bytes)

pub mod format;     // PCM layout and frame sizing
pub mod frame;      // Emitted frames and frame sinks
pub mod pacer;      // Tokio driver for the rechunker
pub mod rechunker;  // Fixed-size frame slicing and pacing state
