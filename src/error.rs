use std::io;

use thiserror::Error;

/// Errors surfaced to `main`. Matches the three kinds spec'd in the error
/// handling design: configuration errors are fatal before any socket opens,
/// resource errors are fatal during initial pool fill, and I/O errors cover
/// everything else that can go wrong talking to a peer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("resource exhaustion: {0}")]
    Resource(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
