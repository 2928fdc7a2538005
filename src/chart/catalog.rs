//! Ordered catalog of available chart updates

use indexmap::IndexSet;
use semver::Version;

/// A registry tag paired with the version it parses to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartUpdate {
    pub tag: String,
    pub version: Version,
}

impl ChartUpdate {
    pub fn new(tag: impl Into<String>, version: Version) -> Self {
        Self {
            tag: tag.into(),
            version,
        }
    }
}

/// Available updates for one chart, sorted from newest to oldest
///
/// Tags are unique; when a tag is given more than once, its first entry
/// wins. Entries whose versions compare equal (e.g. `1.0` and `v1.0.0`) are
/// all kept, ordered by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartUpdates {
    updates: Vec<ChartUpdate>,
}

impl ChartUpdates {
    pub fn new(updates: impl IntoIterator<Item = ChartUpdate>) -> Self {
        let mut seen = IndexSet::new();
        let mut updates: Vec<ChartUpdate> = updates
            .into_iter()
            .filter(|u| seen.insert(u.tag.clone()))
            .collect();
        updates.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.tag.cmp(&b.tag)));
        Self { updates }
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChartUpdate> {
        self.updates.iter()
    }

    pub fn as_slice(&self) -> &[ChartUpdate] {
        &self.updates
    }

    /// The newest available update, if any
    pub fn latest(&self) -> Option<&ChartUpdate> {
        self.updates.first()
    }

    /// Tags in catalog order, for presentation
    pub fn to_tag_list(&self) -> Vec<String> {
        self.updates.iter().map(|u| u.tag.clone()).collect()
    }

    /// Keep only updates strictly newer than `version`
    pub(crate) fn retain_newer_than(&mut self, version: &Version) {
        self.updates.retain(|u| u.version > *version);
    }

    /// Drop the update whose tag is exactly `tag`
    pub(crate) fn remove_tag(&mut self, tag: &str) {
        self.updates.retain(|u| u.tag != tag);
    }
}

impl<'a> IntoIterator for &'a ChartUpdates {
    type Item = &'a ChartUpdate;
    type IntoIter = std::slice::Iter<'a, ChartUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.iter()
    }
}

impl IntoIterator for ChartUpdates {
    type Item = ChartUpdate;
    type IntoIter = std::vec::IntoIter<ChartUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(tag: &str, version: &str) -> ChartUpdate {
        ChartUpdate::new(tag, Version::parse(version).unwrap())
    }

    #[test]
    fn new_sorts_updates_from_newest_to_oldest() {
        let updates = ChartUpdates::new(vec![
            update("1.0.0", "1.0.0"),
            update("v2.0.0", "2.0.0"),
            update("1.5.0", "1.5.0"),
            update("2.0.0-rc.1", "2.0.0-rc.1"),
        ]);

        assert_eq!(
            updates.to_tag_list(),
            vec!["v2.0.0", "2.0.0-rc.1", "1.5.0", "1.0.0"]
        );
    }

    #[test]
    fn new_removes_duplicate_tags() {
        let updates = ChartUpdates::new(vec![
            update("1.0.0", "1.0.0"),
            update("1.1.0", "1.1.0"),
            update("1.0.0", "1.0.0"),
        ]);

        assert_eq!(updates.to_tag_list(), vec!["1.1.0", "1.0.0"]);
    }

    #[test]
    fn new_keeps_first_entry_when_tag_repeats_with_other_version() {
        let updates = ChartUpdates::new(vec![
            update("1.0.0", "2.0.0"),
            update("x", "1.5.0"),
            update("1.0.0", "1.0.0"),
        ]);

        assert_eq!(updates.as_slice(), &[update("1.0.0", "2.0.0"), update("x", "1.5.0")]);
    }

    #[test]
    fn new_keeps_distinct_tags_with_equal_versions_ordered_by_tag() {
        let updates = ChartUpdates::new(vec![update("v1.0", "1.0.0"), update("1.0.0", "1.0.0")]);

        assert_eq!(updates.to_tag_list(), vec!["1.0.0", "v1.0"]);
    }

    #[test]
    fn latest_returns_first_entry_or_none_when_empty() {
        let updates = ChartUpdates::new(vec![update("1.0.0", "1.0.0"), update("3.0.0", "3.0.0")]);
        assert_eq!(updates.latest().map(|u| u.tag.as_str()), Some("3.0.0"));
        assert_eq!(ChartUpdates::default().latest(), None);
    }

    #[test]
    fn retain_newer_than_drops_equal_and_older_versions() {
        let mut updates = ChartUpdates::new(vec![
            update("2.0.0", "2.0.0"),
            update("1.5.0", "1.5.0"),
            update("1.0.0", "1.0.0"),
        ]);

        updates.retain_newer_than(&Version::parse("1.5.0").unwrap());

        assert_eq!(updates.to_tag_list(), vec!["2.0.0"]);
    }
}
