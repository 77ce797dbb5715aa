//! Hooks run while entity metadata is loaded.

use crate::metadata::EntityMetadata;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Adjusts metadata right after the driver has produced it.
pub trait MetadataListener: Send + Sync {
    fn load_class_metadata(&self, metadata: &mut EntityMetadata);
}

/// Ordered set of metadata listeners handed to an entity manager.
#[derive(Clone, Default)]
pub struct OrmEventManager {
    listeners: Vec<Arc<dyn MetadataListener>>,
}

impl OrmEventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn MetadataListener>) {
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Arc<dyn MetadataListener>) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run every listener over `metadata`, in registration order.
    pub fn dispatch_load_class_metadata(&self, metadata: &mut EntityMetadata) {
        for listener in &self.listeners {
            listener.load_class_metadata(metadata);
        }
    }
}

impl fmt::Debug for OrmEventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrmEventManager")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Prepends a fixed prefix (e.g. `wp_`) to every entity table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePrefix {
    prefix: String,
}

impl TablePrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl MetadataListener for TablePrefix {
    fn load_class_metadata(&self, metadata: &mut EntityMetadata) {
        if self.prefix.is_empty() {
            return;
        }
        metadata.table_name = format!("{}{}", self.prefix, metadata.table_name);
        trace!(class = %metadata.class_name, table = %metadata.table_name, "Applied table prefix");
    }
}
