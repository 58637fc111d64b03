//! The merged set: task identifiers whose changes are present on the
//! target branch. Monotonic within a session.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct MergedSet {
    ids: HashSet<String>,
}

impl MergedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Adds a task id. Never removes — the set is monotonic.
    pub fn insert(&mut self, task_id: impl Into<String>) {
        self.ids.insert(task_id.into());
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.ids.contains(task_id)
    }

    pub fn contains_all(&self, task_ids: &[String]) -> bool {
        task_ids.iter().all(|id| self.ids.contains(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_insert_never_shrinks() {
        let mut set = MergedSet::new();
        set.insert("A");
        set.insert("A");
        set.insert("B");
        assert_eq!(set.len(), 2);
        assert!(set.contains("A"));
        assert!(set.contains("B"));
    }

    #[test]
    fn contains_all_requires_every_dependency() {
        let set = MergedSet::from_ids(["A".to_string(), "B".to_string()]);
        assert!(set.contains_all(&["A".to_string(), "B".to_string()]));
        assert!(!set.contains_all(&["A".to_string(), "C".to_string()]));
        assert!(set.contains_all(&[]));
    }
}
