//! Chapter-windowed pagination for image-based readers.
//!
//! A [`ReaderSession`] presents the pages of a growing window of chapters as one
//! flat, bidirectionally scrollable index space. Chapters are fetched on demand
//! from a [`ChapterSource`]; the session keeps the index stable, serializes
//! structural mutations and keeps the reader's place when content is prepended.

pub mod anchor;
pub mod chapter;
pub mod config;
pub mod error;
pub mod loading;
pub mod mapper;
pub mod mode;
pub mod prefetch;
pub mod session;
pub mod source;
pub mod surface;
pub mod tracker;
pub mod window;

pub use chapter::{ChapterId, ChapterOrder, LoadPosition, LoadedChapter, PageRef};
pub use config::{PreloadConfig, ReaderConfig};
pub use error::ReaderError;
pub use mapper::{PageMapper, PagePosition};
pub use mode::ReadingMode;
pub use session::{LoadRequest, ReaderEvent, ReaderSession, Rejection};
pub use source::{ChapterSource, Library, LocalSource, RemoteSource};
pub use surface::SurfaceMetrics;
pub use tracker::{ChangeReason, PageChange, ReadingPosition};
