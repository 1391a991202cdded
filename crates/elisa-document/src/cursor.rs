//! Elisa Query Cursor - Lazy Result Streams
//!
//! Executes a compiled plan over a store cursor. Records are decoded and
//! filtered one at a time; the stream is only materialized when the plan
//! requires an in-memory sort. Pagination and projection are applied last.
//!
//! A failure is yielded exactly once and ends the stream, so a consumer can
//! always distinguish an exhausted result set from a scan that broke off.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::plan::{compare_documents, Plan};
use crate::query::{QueryError, SortKey};
use crate::types::Document;
use elisa_storage::ScanCursor;
use std::fmt;

type Item = Result<Document, QueryError>;
type BoxedIter = Box<dyn Iterator<Item = Item> + Send>;

// =============================================================================
// Query Cursor
// =============================================================================

/// Lazy sequence of query results.
pub struct QueryCursor {
    inner: BoxedIter,
    done: bool,
    yielded: usize,
}

impl QueryCursor {
    /// Run `plan` over the candidate records produced by `source`.
    pub fn run(plan: &Plan, source: ScanCursor) -> Self {
        if plan.is_empty() {
            return Self::empty();
        }

        let predicate = plan.predicate().clone();
        let decoded = source.map(|item| {
            let (id, record) = item?;
            Document::decode(&record).map_err(|source| QueryError::Corrupt { id, source })
        });
        let matched = decoded.filter(move |item| match item {
            Ok(doc) => predicate.matches(doc),
            Err(_) => true,
        });

        let ordered: BoxedIter = if plan.needs_sort() {
            Box::new(SortedDocs::new(matched, plan.sort().to_vec()))
        } else {
            Box::new(matched)
        };

        let paged = Paginate::new(ordered, plan.skip(), plan.limit());
        let inner: BoxedIter = match plan.projection().cloned() {
            Some(projection) => Box::new(paged.map(move |item| item.map(|d| projection.apply(d)))),
            None => Box::new(paged),
        };

        Self {
            inner,
            done: false,
            yielded: 0,
        }
    }

    /// A cursor that yields nothing.
    pub fn empty() -> Self {
        Self {
            inner: Box::new(std::iter::empty()),
            done: true,
            yielded: 0,
        }
    }

    /// Number of documents yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Drain the cursor, stopping at the first error.
    pub fn collect_docs(self) -> Result<Vec<Document>, QueryError> {
        self.collect()
    }
}

impl Iterator for QueryCursor {
    type Item = Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Ok(doc)) => {
                self.yielded += 1;
                Some(Ok(doc))
            }
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl std::iter::FusedIterator for QueryCursor {}

impl fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCursor")
            .field("done", &self.done)
            .field("yielded", &self.yielded)
            .finish()
    }
}

// =============================================================================
// Adapters
// =============================================================================

enum SortState<I> {
    Pending(I, Vec<SortKey>),
    Ready(std::vec::IntoIter<Document>),
    Finished,
}

/// Materializes every match on first pull, then yields them in sort order.
struct SortedDocs<I> {
    state: SortState<I>,
}

impl<I: Iterator<Item = Item>> SortedDocs<I> {
    fn new(inner: I, keys: Vec<SortKey>) -> Self {
        Self {
            state: SortState::Pending(inner, keys),
        }
    }
}

impl<I: Iterator<Item = Item>> Iterator for SortedDocs<I> {
    type Item = Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                SortState::Ready(docs) => return docs.next().map(Ok),
                SortState::Finished => return None,
                SortState::Pending(..) => {}
            }
            let SortState::Pending(inner, keys) =
                std::mem::replace(&mut self.state, SortState::Finished)
            else {
                return None;
            };
            let mut docs = Vec::new();
            for item in inner {
                match item {
                    Ok(doc) => docs.push(doc),
                    Err(err) => return Some(Err(err)),
                }
            }
            // Stable, and ties fall back to the identifier anyway.
            docs.sort_by(|a, b| compare_documents(a, b, &keys));
            self.state = SortState::Ready(docs.into_iter());
        }
    }
}

/// Applies skip and limit to successful items. Errors pass straight through.
struct Paginate<I> {
    inner: I,
    skip: usize,
    remaining: Option<usize>,
}

impl<I> Paginate<I> {
    fn new(inner: I, skip: usize, limit: Option<usize>) -> Self {
        Self {
            inner,
            skip,
            remaining: limit,
        }
    }
}

impl<I: Iterator<Item = Item>> Iterator for Paginate<I> {
    type Item = Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        loop {
            match self.inner.next()? {
                Ok(_) if self.skip > 0 => self.skip -= 1,
                Ok(doc) => {
                    if let Some(remaining) = self.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    return Some(Ok(doc));
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryBuilder, SortOrder};
    use elisa_common::StoreError;
    use elisa_storage::Record;
    use std::collections::BTreeMap;

    fn record(id: &str, n: i64) -> (String, Record) {
        let doc = Document::with_id(id).with("n", n);
        (id.to_string(), doc.encode().unwrap())
    }

    fn source(items: Vec<Result<(String, Record), StoreError>>) -> ScanCursor {
        ScanCursor::new(items.into_iter())
    }

    fn plan(query: crate::query::Query) -> Plan {
        Plan::compile("t", &query, &BTreeMap::new()).unwrap()
    }

    fn ids(docs: &[Document]) -> Vec<String> {
        docs.iter()
            .filter_map(|d| d.id())
            .map(|id| id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_filter_and_paginate() {
        let items = (1..=10).map(|n| Ok(record(&format!("d{:02}", n), n))).collect();
        let query = QueryBuilder::new().gt("n", 2i64).skip(2).limit(3).build();
        let docs = QueryCursor::run(&plan(query), source(items))
            .collect_docs()
            .unwrap();
        assert_eq!(ids(&docs), vec!["d05", "d06", "d07"]);
    }

    #[test]
    fn test_sort_desc() {
        let items = vec![Ok(record("a", 2)), Ok(record("b", 3)), Ok(record("c", 1))];
        let query = QueryBuilder::new().sort("n", SortOrder::Desc).build();
        let docs = QueryCursor::run(&plan(query), source(items))
            .collect_docs()
            .unwrap();
        assert_eq!(ids(&docs), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_scan_error_terminates_stream() {
        let items = vec![
            Ok(record("a", 1)),
            Err(StoreError::IoFailure("disk gone".into())),
            Ok(record("c", 3)),
        ];
        let mut cursor = QueryCursor::run(&plan(QueryBuilder::new().build()), source(items));

        assert!(matches!(cursor.next(), Some(Ok(_))));
        assert!(matches!(cursor.next(), Some(Err(QueryError::Store(_)))));
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
        assert_eq!(cursor.yielded(), 1);
    }

    #[test]
    fn test_scan_error_while_sorting() {
        let items = vec![
            Ok(record("a", 1)),
            Err(StoreError::IoFailure("disk gone".into())),
        ];
        let query = QueryBuilder::new().sort("n", SortOrder::Asc).build();
        let mut cursor = QueryCursor::run(&plan(query), source(items));

        assert!(matches!(cursor.next(), Some(Err(QueryError::Store(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_corrupt_record() {
        let items = vec![Ok(("bad".to_string(), Record::from("not json")))];
        let mut cursor = QueryCursor::run(&plan(QueryBuilder::new().build()), source(items));
        match cursor.next() {
            Some(Err(QueryError::Corrupt { id, .. })) => assert_eq!(id, "bad"),
            other => panic!("expected corrupt record error, got {:?}", other),
        }
    }

    #[test]
    fn test_limit_zero_reads_nothing() {
        let items = vec![Err(StoreError::StoreClosed)];
        let query = QueryBuilder::new().limit(0).build();
        let mut cursor = QueryCursor::run(&plan(query), source(items));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_projection_applied_last() {
        let doc = Document::with_id("a").with("n", 1i64).with("secret", "x");
        let items = vec![Ok(("a".to_string(), doc.encode().unwrap()))];
        let query = QueryBuilder::new()
            .eq("secret", "x")
            .exclude(vec!["secret".into()])
            .build();
        let docs = QueryCursor::run(&plan(query), source(items))
            .collect_docs()
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(!docs[0].contains("secret"));
        assert!(docs[0].contains("n"));
    }
}
