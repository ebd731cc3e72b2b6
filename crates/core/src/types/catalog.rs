//! Immutable collection of task templates for one release

use super::tasks::{TaskId, TaskTemplate};
use crate::errors::{Error, Result};
use indexmap::IndexMap;

/// Task templates of a release, in catalog (insertion) order.
///
/// A catalog is never mutated once built; extending it with plugin tasks
/// produces a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCatalog {
    release: String,
    templates: IndexMap<TaskId, TaskTemplate>,
}

impl TaskCatalog {
    /// Build a catalog, rejecting ids that repeat with different content
    pub fn new<I>(release: impl Into<String>, templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskTemplate>,
    {
        let mut catalog = Self {
            release: release.into(),
            templates: IndexMap::new(),
        };
        for template in templates {
            catalog.insert(template)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, template: TaskTemplate) -> Result<()> {
        match self.templates.get(&template.id) {
            Some(existing) if *existing == template => Ok(()),
            Some(_) => Err(Error::DuplicateTaskId {
                task: template.id.to_string(),
            }),
            None => {
                self.templates.insert(template.id.clone(), template);
                Ok(())
            }
        }
    }

    /// A new catalog holding these templates followed by `extra`
    pub fn extended<I>(&self, extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskTemplate>,
    {
        let mut catalog = self.clone();
        for template in extra {
            catalog.insert(template)?;
        }
        Ok(catalog)
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn get(&self, id: &str) -> Option<&TaskTemplate> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Position of a task in catalog order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.templates.get_index_of(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskTemplate> {
        self.templates.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.templates.keys()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskType;

    fn shell(id: &str) -> TaskTemplate {
        TaskTemplate::new(id).with_type(TaskType::Shell)
    }

    #[test]
    fn test_preserves_insertion_order() {
        let catalog = TaskCatalog::new("2024.1", vec![shell("b"), shell("a"), shell("c")]).unwrap();
        let ids: Vec<&str> = catalog.ids().map(TaskId::as_str).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(catalog.position("a"), Some(1));
        assert_eq!(catalog.release(), "2024.1");
    }

    #[test]
    fn test_identical_duplicate_is_ignored() {
        let catalog = TaskCatalog::new("r", vec![shell("a"), shell("a")]).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_conflicting_duplicate_fails() {
        let result = TaskCatalog::new(
            "r",
            vec![shell("a"), TaskTemplate::new("a").with_type(TaskType::Puppet)],
        );
        assert!(matches!(result, Err(Error::DuplicateTaskId { task }) if task == "a"));
    }

    #[test]
    fn test_extended_leaves_original_untouched() {
        let base = TaskCatalog::new("r", vec![shell("a")]).unwrap();
        let extended = base.extended(vec![shell("plugin_task")]).unwrap();

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(extended.contains("plugin_task"));
        assert!(!base.contains("plugin_task"));
    }
}
