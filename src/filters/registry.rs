//! Filter registry for managing available filter types.

use crate::core::error::{ConfigError, ToneStackError, ToneStackResult};
use crate::core::filter::{Category, Filter, FilterMetadata};
use crate::settings::Settings;
use indexmap::IndexMap;
use log::warn;
use std::sync::Arc;

/// Factory function for creating configured filter instances.
pub type FilterFactory =
    Arc<dyn Fn(&Settings) -> Result<Box<dyn Filter>, ConfigError> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: FilterFactory,
    /// Cached metadata (avoids creating instance just to get metadata).
    pub metadata: FilterMetadata,
    /// Whether this filter is enabled.
    pub enabled: bool,
    /// Tags for organization and search.
    pub tags: Vec<String>,
}

/// Registry for all available filter types.
///
/// The registry maps filter ids to factories that build a filter from a
/// [`Settings`] value. It provides methods for registration, lookup, and
/// organization of filters.
pub struct FilterRegistry {
    /// Filters indexed by their unique ID.
    filters: IndexMap<String, RegistryEntry>,
    /// Filters grouped by category.
    categories: IndexMap<Category, Vec<String>>,
}

impl FilterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            filters: IndexMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry);
        registry
    }

    /// Register a filter type.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn(&Settings) -> Result<Box<dyn Filter>, ConfigError> + Send + Sync + 'static,
    {
        self.register_with_tags(factory, Vec::new());
    }

    /// Register a filter with additional tags.
    ///
    /// The factory is called once with default settings to read the metadata;
    /// a factory that rejects the defaults is not registered.
    pub fn register_with_tags<F>(&mut self, factory: F, tags: Vec<String>)
    where
        F: Fn(&Settings) -> Result<Box<dyn Filter>, ConfigError> + Send + Sync + 'static,
    {
        let metadata = match factory(&Settings::default()) {
            Ok(instance) => instance.metadata(),
            Err(e) => {
                warn!("Skipping filter registration: {}", e);
                return;
            }
        };
        let id = metadata.id.clone();
        let category = metadata.category;

        let entry = RegistryEntry {
            factory: Arc::new(factory),
            metadata,
            enabled: true,
            tags,
        };

        if self.filters.insert(id.clone(), entry).is_none() {
            self.categories.entry(category).or_default().push(id);
        }
    }

    /// Create a new instance of a filter by ID.
    pub fn create(&self, id: &str, settings: &Settings) -> ToneStackResult<Box<dyn Filter>> {
        let entry = self
            .filters
            .get(id)
            .filter(|e| e.enabled)
            .ok_or_else(|| ToneStackError::FilterNotFound(id.to_string()))?;
        Ok((entry.factory)(settings)?)
    }

    /// Get metadata for a filter without creating an instance.
    pub fn get_metadata(&self, id: &str) -> Option<&FilterMetadata> {
        self.filters.get(id).map(|e| &e.metadata)
    }

    /// Get a registry entry.
    pub fn get_entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.filters.get(id)
    }

    /// Check if a filter is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    /// Get all registered filter IDs.
    pub fn filter_ids(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(|s| s.as_str())
    }

    /// Get all registered filters.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get filters by category.
    pub fn filters_by_category(&self, category: &Category) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Get all categories.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.keys()
    }

    /// Search filters by id, name, description or tag.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();

        self.filters
            .iter()
            .filter(|(_, entry)| {
                let name_match = entry.metadata.name.to_lowercase().contains(&query);
                let desc_match = entry.metadata.description.to_lowercase().contains(&query);
                let tag_match = entry.tags.iter().any(|t| t.to_lowercase().contains(&query));
                let id_match = entry.metadata.id.to_lowercase().contains(&query);

                name_match || desc_match || tag_match || id_match
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Enable or disable a filter.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        if let Some(entry) = self.filters.get_mut(id) {
            entry.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Unregister a filter.
    pub fn unregister(&mut self, id: &str) -> bool {
        if let Some(entry) = self.filters.shift_remove(id) {
            let category = entry.metadata.category;
            if let Some(ids) = self.categories.get_mut(&category) {
                ids.retain(|i| i != id);
                if ids.is_empty() {
                    self.categories.shift_remove(&category);
                }
            }
            true
        } else {
            false
        }
    }

    /// Get the total number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Metadata of every enabled filter, grouped by category in registration
    /// order.
    pub fn grouped_by_category(&self) -> Vec<(Category, Vec<&FilterMetadata>)> {
        self.categories
            .iter()
            .map(|(category, ids)| {
                let filters = ids
                    .iter()
                    .filter_map(|id| self.filters.get(id))
                    .filter(|e| e.enabled)
                    .map(|e| &e.metadata)
                    .collect::<Vec<_>>();
                (*category, filters)
            })
            .filter(|(_, filters)| !filters.is_empty())
            .collect()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
