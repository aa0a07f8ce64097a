use crate::collection::Collection;
use crate::common::{FieldPath, DEFAULT_COLLECTION_NAME};
use crate::errors::{ErrorKind, RippleError, RippleResult};
use crate::persistence::PersistenceAdapter;
use crate::reactivity::ReactivityAdapter;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Settings of one collection.
///
/// Cheap to clone; clones share state. Settings are frozen once the
/// collection is opened.
#[derive(Clone)]
pub struct CollectionConfig {
    inner: Arc<CollectionConfigInner>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionConfig {
    pub fn new() -> Self {
        CollectionConfig {
            inner: Arc::new(CollectionConfigInner::new()),
        }
    }

    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    pub fn set_name(&self, name: &str) -> RippleResult<()> {
        self.inner.check_not_configured("name")?;
        if name.trim().is_empty() {
            log::error!("Collection name cannot be empty");
            return Err(RippleError::new(
                "Collection name cannot be empty",
                ErrorKind::InvalidOperation,
            ));
        }
        *self.inner.name.write() = name.to_string();
        Ok(())
    }

    /// Fields indexed when the collection opens.
    pub fn index_fields(&self) -> Vec<String> {
        self.inner.index_fields.read().clone()
    }

    pub fn add_index_field(&self, field: &str) -> RippleResult<()> {
        self.inner.check_not_configured("index fields")?;
        let path = FieldPath::parse(field);
        if path.is_malformed() || path.has_positional() {
            log::error!("Cannot index invalid field path '{}'", field);
            return Err(RippleError::new(
                &format!("Cannot index invalid field path '{}'", field),
                ErrorKind::IndexingError,
            ));
        }

        let mut fields = self.inner.index_fields.write();
        if fields.iter().any(|f| f == field) {
            log::error!("Index field {} declared twice", field);
            return Err(RippleError::new(
                &format!("Index on '{}' already declared", field),
                ErrorKind::IndexAlreadyExists,
            ));
        }
        fields.push(field.to_string());
        Ok(())
    }

    pub fn reactivity(&self) -> Option<Arc<dyn ReactivityAdapter>> {
        self.inner.reactivity.read().clone()
    }

    pub fn set_reactivity(&self, adapter: Arc<dyn ReactivityAdapter>) -> RippleResult<()> {
        self.inner.check_not_configured("reactivity adapter")?;
        *self.inner.reactivity.write() = Some(adapter);
        Ok(())
    }

    pub fn persistence(&self) -> Option<Arc<dyn PersistenceAdapter>> {
        self.inner.persistence.read().clone()
    }

    pub fn set_persistence(&self, adapter: Arc<dyn PersistenceAdapter>) -> RippleResult<()> {
        self.inner.check_not_configured("persistence adapter")?;
        *self.inner.persistence.write() = Some(adapter);
        Ok(())
    }

    /// Whether selectors with unknown operators are rejected instead of
    /// matching nothing.
    pub fn strict_selectors(&self) -> bool {
        self.inner.strict_selectors.load(Ordering::Relaxed)
    }

    pub fn set_strict_selectors(&self, strict: bool) -> RippleResult<()> {
        self.inner.check_not_configured("strict selectors")?;
        self.inner.strict_selectors.store(strict, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn freeze(&self) {
        self.inner.configured.store(true, Ordering::Release);
    }
}

struct CollectionConfigInner {
    configured: AtomicBool,
    name: RwLock<String>,
    index_fields: RwLock<Vec<String>>,
    reactivity: RwLock<Option<Arc<dyn ReactivityAdapter>>>,
    persistence: RwLock<Option<Arc<dyn PersistenceAdapter>>>,
    strict_selectors: AtomicBool,
}

impl CollectionConfigInner {
    fn new() -> Self {
        CollectionConfigInner {
            configured: AtomicBool::new(false),
            name: RwLock::new(DEFAULT_COLLECTION_NAME.to_string()),
            index_fields: RwLock::new(Vec::new()),
            reactivity: RwLock::new(None),
            persistence: RwLock::new(None),
            strict_selectors: AtomicBool::new(false),
        }
    }

    fn check_not_configured(&self, setting: &str) -> RippleResult<()> {
        if self.configured.load(Ordering::Acquire) {
            log::error!("Cannot change {} after the collection is opened", setting);
            return Err(RippleError::new(
                &format!("Cannot change {} after the collection is opened", setting),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [Collection].
///
/// The first configuration error is kept and returned by
/// [open](CollectionBuilder::open).
///
/// ```rust
/// use ripple::collection::CollectionBuilder;
///
/// let todos = CollectionBuilder::new()
///     .name("todos")
///     .index("status")
///     .strict_selectors(true)
///     .open()
///     .unwrap();
/// assert_eq!(todos.name(), "todos");
/// assert!(todos.has_index("status"));
/// ```
#[derive(Default)]
pub struct CollectionBuilder {
    error: Option<RippleError>,
    config: CollectionConfig,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        CollectionBuilder::default()
    }

    fn apply(mut self, setter: impl FnOnce(&CollectionConfig) -> RippleResult<()>) -> Self {
        if self.error.is_none() {
            if let Err(e) = setter(&self.config) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.apply(|config| config.set_name(name))
    }

    pub fn index(self, field: &str) -> Self {
        self.apply(|config| config.add_index_field(field))
    }

    pub fn reactivity(self, adapter: Arc<dyn ReactivityAdapter>) -> Self {
        self.apply(|config| config.set_reactivity(adapter))
    }

    pub fn persistence(self, adapter: Arc<dyn PersistenceAdapter>) -> Self {
        self.apply(|config| config.set_persistence(adapter))
    }

    pub fn strict_selectors(self, strict: bool) -> Self {
        self.apply(|config| config.set_strict_selectors(strict))
    }

    /// Validates the configuration and opens the collection.
    pub fn open(self) -> RippleResult<Collection> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Collection::open(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryAdapter;

    #[test]
    fn defaults() {
        let config = CollectionConfig::new();
        assert_eq!(config.name(), DEFAULT_COLLECTION_NAME);
        assert!(config.index_fields().is_empty());
        assert!(config.reactivity().is_none());
        assert!(config.persistence().is_none());
        assert!(!config.strict_selectors());
    }

    #[test]
    fn builder_keeps_first_error() {
        let result = CollectionBuilder::new()
            .name("")
            .index("a..b")
            .open();
        let err = result.err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);

        let err = CollectionBuilder::new().index("a").index("a").open().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::IndexAlreadyExists);

        let err = CollectionBuilder::new().index("items.$.sku").open().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::IndexingError);
    }

    #[test]
    fn frozen_after_freeze() {
        let config = CollectionConfig::new();
        config.set_persistence(Arc::new(MemoryAdapter::new("m"))).unwrap();
        assert!(config.persistence().is_some());
        config.freeze();
        let err = config.set_name("other").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        assert!(config.set_strict_selectors(true).is_err());
    }
}
