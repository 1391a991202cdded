//! Elisa Document Index
//!
//! In-memory secondary indexes over one field. Hash indexes answer equality
//! and set-membership lookups; B-tree indexes additionally answer ordered
//! range scans. Only scalar values (null, bool, number, string) are indexed;
//! documents whose field is missing or holds an array or object are absent
//! from the index.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, DocumentId, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

// =============================================================================
// Index Type
// =============================================================================

/// Type of document index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// Hash index for equality lookups.
    Hash,
    /// B-tree index for equality and range queries.
    BTree,
}

impl IndexType {
    pub fn supports_range(&self) -> bool {
        matches!(self, Self::BTree)
    }
}

/// Whether a value can be stored as an index key.
pub fn is_indexable(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

// =============================================================================
// Document Index
// =============================================================================

enum Entries {
    Hash(HashMap<Value, BTreeSet<DocumentId>>),
    Tree(BTreeMap<Value, BTreeSet<DocumentId>>),
}

/// Index for efficient document queries.
pub struct DocumentIndex {
    field: String,
    index_type: IndexType,
    entries: Entries,
    /// Current key of every indexed document.
    keys: HashMap<DocumentId, Value>,
}

impl DocumentIndex {
    /// Create a new index.
    pub fn new(field: impl Into<String>, index_type: IndexType) -> Self {
        let entries = match index_type {
            IndexType::Hash => Entries::Hash(HashMap::new()),
            IndexType::BTree => Entries::Tree(BTreeMap::new()),
        };
        Self {
            field: field.into(),
            index_type,
            entries,
            keys: HashMap::new(),
        }
    }

    /// Get the indexed field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Get the index type.
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    fn key_of(&self, doc: &Document) -> Option<Value> {
        doc.lookup(&self.field)
            .filter(|value| is_indexable(value))
            .map(|value| value.into_owned())
    }

    /// Index a document, replacing any entry it already had.
    pub fn index_document(&mut self, id: &DocumentId, doc: &Document) {
        self.remove_document(id);
        let Some(key) = self.key_of(doc) else {
            return;
        };
        match &mut self.entries {
            Entries::Hash(map) => map.entry(key.clone()).or_default().insert(id.clone()),
            Entries::Tree(map) => map.entry(key.clone()).or_default().insert(id.clone()),
        };
        self.keys.insert(id.clone(), key);
    }

    /// Remove a document from the index, returning whether it was indexed.
    pub fn remove_document(&mut self, id: &DocumentId) -> bool {
        let Some(key) = self.keys.remove(id) else {
            return false;
        };
        match &mut self.entries {
            Entries::Hash(map) => {
                if take_id(map.get_mut(&key), id) {
                    map.remove(&key);
                }
            }
            Entries::Tree(map) => {
                if take_id(map.get_mut(&key), id) {
                    map.remove(&key);
                }
            }
        }
        true
    }

    /// Identifiers of documents whose field equals any of `keys`, ascending.
    pub fn find_eq(&self, keys: &[Value]) -> Vec<DocumentId> {
        let mut ids = BTreeSet::new();
        for key in keys {
            let found = match &self.entries {
                Entries::Hash(map) => map.get(key),
                Entries::Tree(map) => map.get(key),
            };
            if let Some(found) = found {
                ids.extend(found.iter().cloned());
            }
        }
        ids.into_iter().collect()
    }

    /// Identifiers of documents whose field lies within the bounds, in key
    /// order (reversed when `descending`), ties by ascending identifier.
    ///
    /// Returns `None` for index types without ordering.
    pub fn find_range(
        &self,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
        descending: bool,
    ) -> Option<Vec<DocumentId>> {
        let Entries::Tree(map) = &self.entries else {
            return None;
        };
        if range_is_empty(lower, upper) {
            return Some(Vec::new());
        }

        let range = map.range::<Value, _>((lower, upper));
        let ids = if descending {
            range.rev().flat_map(|(_, ids)| ids.iter().cloned()).collect()
        } else {
            range.flat_map(|(_, ids)| ids.iter().cloned()).collect()
        };
        Some(ids)
    }

    /// Clear the index.
    pub fn clear(&mut self) {
        match &mut self.entries {
            Entries::Hash(map) => map.clear(),
            Entries::Tree(map) => map.clear(),
        }
        self.keys.clear();
    }

    /// Get the number of unique keys.
    pub fn key_count(&self) -> usize {
        match &self.entries {
            Entries::Hash(map) => map.len(),
            Entries::Tree(map) => map.len(),
        }
    }

    /// Get the number of indexed documents.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("field", &self.field)
            .field("index_type", &self.index_type)
            .field("len", &self.keys.len())
            .finish()
    }
}

/// Remove `id` from a key's set, reporting whether the set is now empty.
fn take_id(ids: Option<&mut BTreeSet<DocumentId>>, id: &DocumentId) -> bool {
    match ids {
        Some(ids) => {
            ids.remove(id);
            ids.is_empty()
        }
        None => false,
    }
}

/// True when no key can satisfy both bounds. `BTreeMap::range` panics on
/// such bounds, so they are screened out first.
fn range_is_empty(lower: Bound<&Value>, upper: Bound<&Value>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo.cmp(hi) != Ordering::Less,
    }
}

// =============================================================================
// Tests
// =============================================================================
