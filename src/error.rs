use thiserror::Error;

use crate::chapter::ChapterId;

/// Errors surfaced by the reader. None of them end a session.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// The content source failed to produce a chapter's pages.
    #[error("failed to fetch chapter '{chapter}'")]
    Fetch {
        chapter: ChapterId,
        #[source]
        source: anyhow::Error,
    },

    #[error("chapter '{0}' is not part of this source")]
    UnknownChapter(ChapterId),

    #[error("'{location}' is not a readable chapter source")]
    InvalidSource { location: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}
