//! Logging infrastructure: tracing-subscriber setup and secret scrubbing
//! for agent stdout before it's retained in a `WorkerRecord` or written to
//! an iteration log.

pub mod logger;
pub mod secret_scrubbing;

pub use logger::LoggerImpl;
pub use secret_scrubbing::SecretScrubbingLayer;
