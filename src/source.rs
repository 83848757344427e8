//! Content sources: turn a chapter id into its ordered page references.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow, bail};
use log::debug;
use reqwest::Url;
use serde::Deserialize;

use crate::{
    chapter::{ChapterId, ChapterOrder, PageRef},
    error::ReaderError,
};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "avif"];

/// Anything that can produce the pages of a chapter.
///
/// The reader treats this as a black box: it never retries a failed fetch on
/// its own, and it may drop the returned future at any await point.
pub trait ChapterSource: Send + Sync + 'static {
    fn fetch_pages(&self, chapter: &ChapterId) -> impl Future<Output = anyhow::Result<Vec<PageRef>>> + Send;
}

#[derive(Clone, Debug)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ReaderError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ReaderError::InvalidSource { location: root.display().to_string() });
        }
        Ok(Self { root })
    }

    /// Every sub-directory of the root is a chapter, in natural name order.
    pub async fn list_chapters(&self) -> Result<ChapterOrder, ReaderError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_by(|a, b| natord::compare_ignore_case(a, b));
        debug!("found {} chapters under {}", names.len(), self.root.display());
        Ok(ChapterOrder::new(names.into_iter().map(ChapterId::new).collect()))
    }

    fn chapter_dir(&self, chapter: &ChapterId) -> anyhow::Result<PathBuf> {
        let name = chapter.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            bail!("'{name}' is not a chapter directory name");
        }
        Ok(self.root.join(name))
    }
}

impl ChapterSource for LocalSource {
    async fn fetch_pages(&self, chapter: &ChapterId) -> anyhow::Result<Vec<PageRef>> {
        let dir = self.chapter_dir(chapter)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading {}", dir.display()))?;
        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_image(&path) {
                pages.push(path);
            }
        }
        pages.sort_by(|a, b| natord::compare_ignore_case(&file_name(a), &file_name(b)));
        Ok(pages.into_iter().map(PageRef::Local).collect())
    }
}

#[derive(Deserialize)]
struct ChapterList {
    chapters: Vec<ChapterId>,
}

#[derive(Deserialize)]
struct PageList {
    pages: Vec<String>,
}

/// A JSON-over-HTTP source.
///
/// `GET {base}/chapters.json` lists chapter ids in reading order and
/// `GET {base}/chapters/{id}.json` lists page image URLs, absolute or relative
/// to `base`.
#[derive(Clone, Debug)]
pub struct RemoteSource {
    client: reqwest::Client,
    base: Url,
}

impl RemoteSource {
    pub fn new(base: &str) -> Result<Self, ReaderError> {
        let invalid = || ReaderError::InvalidSource { location: base.to_string() };
        let base = Url::parse(base).map_err(|_| invalid())?;
        if base.cannot_be_a_base() {
            return Err(invalid());
        }
        let client = reqwest::Client::builder()
            .user_agent("rmanga/0.1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self { client, base })
    }

    /// `base` with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("{} cannot take a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn chapter_url(&self, chapter: &ChapterId) -> anyhow::Result<Url> {
        self.endpoint(&["chapters", &format!("{chapter}.json")])
    }

    pub async fn list_chapters(&self) -> Result<ChapterOrder, ReaderError> {
        let url = self.endpoint(&["chapters.json"]).map_err(|_| ReaderError::InvalidSource {
            location: self.base.to_string(),
        })?;
        let list: ChapterList = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ChapterOrder::new(list.chapters))
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if let Some(rest) = url.strip_prefix("//") {
            format!("https://{rest}")
        } else {
            format!("{}/{}", self.base.as_str().trim_end_matches('/'), url.trim_start_matches('/'))
        }
    }
}

impl ChapterSource for RemoteSource {
    async fn fetch_pages(&self, chapter: &ChapterId) -> anyhow::Result<Vec<PageRef>> {
        let url = self.chapter_url(chapter)?;
        let list: PageList = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.pages.iter().map(|page| PageRef::Remote(self.resolve_url(page))).collect())
    }
}

/// The source the binary reads from, picked from the command line.
#[derive(Clone, Debug)]
pub enum Library {
    Local(LocalSource),
    Remote(RemoteSource),
}

impl Library {
    pub fn open(location: &str) -> Result<Self, ReaderError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Ok(Library::Remote(RemoteSource::new(location)?))
        } else {
            Ok(Library::Local(LocalSource::open(location)?))
        }
    }

    pub async fn list_chapters(&self) -> Result<ChapterOrder, ReaderError> {
        match self {
            Library::Local(source) => source.list_chapters().await,
            Library::Remote(source) => source.list_chapters().await,
        }
    }
}

impl ChapterSource for Library {
    async fn fetch_pages(&self, chapter: &ChapterId) -> anyhow::Result<Vec<PageRef>> {
        match self {
            Library::Local(source) => source.fetch_pages(chapter).await,
            Library::Remote(source) => source.fetch_pages(chapter).await,
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}
