use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(String);

impl ChapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChapterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where a single page's image lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PageRef {
    Local(PathBuf),
    Remote(String),
}

impl PageRef {
    /// Stable key used by the front end to cache decoded images.
    pub fn key(&self) -> String {
        match self {
            PageRef::Local(path) => path.display().to_string(),
            PageRef::Remote(url) => url.clone(),
        }
    }
}

/// Which edge of the window a load is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadPosition {
    Initial,
    Previous,
    Next,
}

/// A fetched chapter. Its page list never changes after the fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedChapter {
    id: ChapterId,
    pages: Arc<[PageRef]>,
}

impl LoadedChapter {
    pub fn new(id: ChapterId, pages: Vec<PageRef>) -> Self {
        Self { id, pages: pages.into() }
    }

    pub fn id(&self) -> &ChapterId {
        &self.id
    }

    pub fn pages(&self) -> &[PageRef] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Navigation order of every chapter the source knows about.
#[derive(Clone, Debug, Default)]
pub struct ChapterOrder {
    ids: Vec<ChapterId>,
    positions: HashMap<ChapterId, usize>,
}

impl ChapterOrder {
    pub fn new(ids: Vec<ChapterId>) -> Self {
        let mut order = Self::default();
        for id in ids {
            if order.positions.contains_key(&id) {
                continue;
            }
            order.positions.insert(id.clone(), order.ids.len());
            order.ids.push(id);
        }
        order
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &ChapterId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn position(&self, id: &ChapterId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn first(&self) -> Option<&ChapterId> {
        self.ids.first()
    }

    pub fn previous(&self, id: &ChapterId) -> Option<&ChapterId> {
        let pos = self.position(id)?;
        pos.checked_sub(1).and_then(|p| self.ids.get(p))
    }

    pub fn next(&self, id: &ChapterId) -> Option<&ChapterId> {
        let pos = self.position(id)?;
        self.ids.get(pos + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChapterId> {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(ids: &[&str]) -> ChapterOrder {
        ChapterOrder::new(ids.iter().map(|id| ChapterId::from(*id)).collect())
    }

    #[test]
    fn neighbours_follow_navigation_order() {
        let order = order(&["a", "b", "c"]);
        let b = ChapterId::from("b");
        assert_eq!(order.previous(&b), Some(&ChapterId::from("a")));
        assert_eq!(order.next(&b), Some(&ChapterId::from("c")));
        assert_eq!(order.previous(&ChapterId::from("a")), None);
        assert_eq!(order.next(&ChapterId::from("c")), None);
    }

    #[test]
    fn unknown_chapter_has_no_neighbours() {
        let order = order(&["a", "b"]);
        let z = ChapterId::from("z");
        assert!(!order.contains(&z));
        assert_eq!(order.next(&z), None);
        assert_eq!(order.previous(&z), None);
    }

    #[test]
    fn duplicate_ids_keep_first_position() {
        let order = order(&["a", "b", "a", "c"]);
        assert_eq!(order.len(), 3);
        assert_eq!(order.position(&ChapterId::from("c")), Some(2));
    }
}
