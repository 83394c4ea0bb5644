//! Named resource lookup for content streams.

use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use crate::store::{tolerate, ObjectStore};
use std::sync::Arc;

/// A `/Resources` dictionary bound to the store that resolves its values.
#[derive(Debug, Clone)]
pub struct Resources<'s> {
    store: &'s ObjectStore,
    dict: Arc<Dict>,
}

impl<'s> Resources<'s> {
    /// Wrap a resource dictionary.
    pub fn new(store: &'s ObjectStore, dict: Dict) -> Self {
        Self {
            store,
            dict: Arc::new(dict),
        }
    }

    /// Resources with no entries.
    pub fn empty(store: &'s ObjectStore) -> Self {
        Self::new(store, Dict::new())
    }

    /// The raw dictionary.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    /// The store values resolve through.
    pub fn store(&self) -> &'s ObjectStore {
        self.store
    }

    /// Resolve `/category /name`, e.g. `("Font", "F1")`.
    ///
    /// Missing categories, missing names and unparseable values are all
    /// `Ok(None)`.
    pub fn lookup(&self, category: &str, name: &str) -> Result<Option<Arc<Object>>> {
        Ok(self.lookup_with_ref(category, name)?.map(|(_, value)| value))
    }

    /// Like [`lookup`](Self::lookup), also returning the reference the value
    /// was reached through, if any.
    pub fn lookup_with_ref(&self, category: &str, name: &str) -> Result<Option<(Option<ObjectRef>, Arc<Object>)>> {
        let what = format!("resource /{} /{}", category, name);
        let entries = tolerate(self.store.resolve_dict_entry(&self.dict, category), &what)?;
        let Some(entries) = entries else {
            return Ok(None);
        };
        let Some(value) = entries.as_dict().and_then(|d| d.get(name)) else {
            return Ok(None);
        };
        let reference = value.as_reference();
        Ok(tolerate(self.store.resolve(value), &what)?.map(|handle| (reference, handle.into_shared())))
    }
}
