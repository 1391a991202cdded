//! Elisa Query Planner
//!
//! Compiles a query descriptor into an execution plan. Compilation checks
//! operand shapes and regex patterns, normalizes the predicate tree, and
//! picks an access path: a full store scan, an index lookup, or an index
//! range scan. Index candidates are always re-checked against the complete
//! predicate, so the access path affects cost only, never results.
//!
//! Key Features:
//! - Fail-fast `InvalidQuery` before any store access
//! - AND/OR flattening, constant folding, double-negation removal
//! - Index lookup for equality and `in` on indexed fields
//! - Ordered B-tree range scans that avoid an in-memory sort
//! - Human-readable `explain()` output
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::index::{is_indexable, IndexType};
use crate::query::{Filter, Projection, Query, QueryError, SortKey, SortOrder};
use crate::types::{Document, Value};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

// =============================================================================
// Predicate
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

/// Compiled, normalized filter.
#[derive(Debug, Clone)]
pub enum Predicate {
    Const(bool),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    Exists {
        field: String,
        exists: bool,
    },
    Regex {
        field: String,
        regex: Regex,
    },
    Contains {
        field: String,
        value: Value,
    },
    StartsWith {
        field: String,
        prefix: String,
    },
    EndsWith {
        field: String,
        suffix: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Compile and normalize a filter.
    pub fn compile(filter: &Filter) -> Result<Self, QueryError> {
        Ok(normalize(compile_filter(filter)?))
    }

    /// Evaluate against a document. AND and OR short-circuit left to right.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Const(b) => *b,
            Self::Compare { field, op, value } => {
                let found = doc.lookup(field);
                match op {
                    CompareOp::Eq => found.is_some_and(|v| *v == *value),
                    CompareOp::Ne => !found.is_some_and(|v| *v == *value),
                    CompareOp::Gt => ordering(found.as_deref(), value) == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(
                        ordering(found.as_deref(), value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => ordering(found.as_deref(), value) == Some(Ordering::Less),
                    CompareOp::Lte => matches!(
                        ordering(found.as_deref(), value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                }
            }
            Self::In {
                field,
                values,
                negated,
            } => {
                let member = doc.lookup(field).is_some_and(|v| values.contains(&*v));
                member != *negated
            }
            Self::Exists { field, exists } => doc.lookup(field).is_some() == *exists,
            Self::Regex { field, regex } => match doc.lookup(field).as_deref() {
                Some(Value::String(s)) => regex.is_match(s),
                _ => false,
            },
            Self::Contains { field, value } => match (doc.lookup(field).as_deref(), value) {
                (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
                (Some(Value::Array(items)), _) => items.contains(value),
                _ => false,
            },
            Self::StartsWith { field, prefix } => match doc.lookup(field).as_deref() {
                Some(Value::String(s)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            Self::EndsWith { field, suffix } => match doc.lookup(field).as_deref() {
                Some(Value::String(s)) => s.ends_with(suffix.as_str()),
                _ => false,
            },
            Self::And(children) => children.iter().all(|c| c.matches(doc)),
            Self::Or(children) => children.iter().any(|c| c.matches(doc)),
            Self::Not(child) => !child.matches(doc),
        }
    }
}

fn ordering(found: Option<&Value>, literal: &Value) -> Option<Ordering> {
    found.and_then(|v| v.compare(literal))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(b) => write!(f, "{}", b),
            Self::Compare { field, op, value } => write!(f, "{} {} {}", field, op.symbol(), value),
            Self::In {
                field,
                values,
                negated,
            } => {
                let op = if *negated { "not in" } else { "in" };
                write!(f, "{} {} {}", field, op, Value::Array(values.clone()))
            }
            Self::Exists { field, exists } => {
                if *exists {
                    write!(f, "{} exists", field)
                } else {
                    write!(f, "{} missing", field)
                }
            }
            Self::Regex { field, regex } => write!(f, "{} =~ /{}/", field, regex.as_str()),
            Self::Contains { field, value } => write!(f, "{} contains {}", field, value),
            Self::StartsWith { field, prefix } => write!(f, "{} starts with {:?}", field, prefix),
            Self::EndsWith { field, suffix } => write!(f, "{} ends with {:?}", field, suffix),
            Self::And(children) => write_joined(f, children, " AND "),
            Self::Or(children) => write_joined(f, children, " OR "),
            Self::Not(child) => write!(f, "NOT ({})", child),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

// =============================================================================
// Compilation
// =============================================================================

fn check_field(field: &str) -> Result<(), QueryError> {
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return Err(QueryError::invalid(format!("invalid field name {:?}", field)));
    }
    Ok(())
}

fn compile_compare(field: &str, op: CompareOp, value: &Value) -> Result<Predicate, QueryError> {
    check_field(field)?;
    if op.is_ordering() && matches!(value, Value::Null | Value::Array(_) | Value::Object(_)) {
        return Err(QueryError::invalid(format!(
            "operator {} cannot compare against {} on field '{}'",
            op.symbol(),
            value.type_name(),
            field
        )));
    }
    Ok(Predicate::Compare {
        field: field.to_string(),
        op,
        value: value.clone(),
    })
}

fn compile_set(field: &str, value: &Value, negated: bool) -> Result<Predicate, QueryError> {
    check_field(field)?;
    let Value::Array(values) = value else {
        return Err(QueryError::invalid(format!(
            "operator {} on field '{}' requires an array operand, got {}",
            if negated { "nin" } else { "in" },
            field,
            value.type_name()
        )));
    };
    Ok(Predicate::In {
        field: field.to_string(),
        values: values.clone(),
        negated,
    })
}

fn compile_filter(filter: &Filter) -> Result<Predicate, QueryError> {
    match filter {
        Filter::Eq { field, value } => compile_compare(field, CompareOp::Eq, value),
        Filter::Ne { field, value } => compile_compare(field, CompareOp::Ne, value),
        Filter::Gt { field, value } => compile_compare(field, CompareOp::Gt, value),
        Filter::Gte { field, value } => compile_compare(field, CompareOp::Gte, value),
        Filter::Lt { field, value } => compile_compare(field, CompareOp::Lt, value),
        Filter::Lte { field, value } => compile_compare(field, CompareOp::Lte, value),
        Filter::In { field, value } => compile_set(field, value, false),
        Filter::Nin { field, value } => compile_set(field, value, true),
        Filter::Exists { field, exists } => {
            check_field(field)?;
            Ok(Predicate::Exists {
                field: field.clone(),
                exists: *exists,
            })
        }
        Filter::Regex { field, pattern } => {
            check_field(field)?;
            let regex = regex::RegexBuilder::new(pattern)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|e| QueryError::invalid(format!("invalid regex {:?}: {}", pattern, e)))?;
            Ok(Predicate::Regex {
                field: field.clone(),
                regex,
            })
        }
        Filter::Contains { field, value } => {
            check_field(field)?;
            Ok(Predicate::Contains {
                field: field.clone(),
                value: value.clone(),
            })
        }
        Filter::StartsWith { field, value } => {
            check_field(field)?;
            Ok(Predicate::StartsWith {
                field: field.clone(),
                prefix: value.clone(),
            })
        }
        Filter::EndsWith { field, value } => {
            check_field(field)?;
            Ok(Predicate::EndsWith {
                field: field.clone(),
                suffix: value.clone(),
            })
        }
        Filter::And { filters } => Ok(Predicate::And(
            filters.iter().map(compile_filter).collect::<Result<_, _>>()?,
        )),
        Filter::Or { filters } => Ok(Predicate::Or(
            filters.iter().map(compile_filter).collect::<Result<_, _>>()?,
        )),
        Filter::Not { filter } => Ok(Predicate::Not(Box::new(compile_filter(filter)?))),
    }
}

/// Flatten nested AND/OR, fold constants, collapse single-child nodes and
/// remove double negation.
fn normalize(predicate: Predicate) -> Predicate {
    match predicate {
        Predicate::And(children) => {
            let mut flat = Vec::with_capacity(children.len());
            for child in children {
                match normalize(child) {
                    Predicate::Const(true) => {}
                    Predicate::Const(false) => return Predicate::Const(false),
                    Predicate::And(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            collapse(flat, true)
        }
        Predicate::Or(children) => {
            let mut flat = Vec::with_capacity(children.len());
            for child in children {
                match normalize(child) {
                    Predicate::Const(false) => {}
                    Predicate::Const(true) => return Predicate::Const(true),
                    Predicate::Or(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            collapse(flat, false)
        }
        Predicate::Not(child) => match normalize(*child) {
            Predicate::Not(inner) => *inner,
            Predicate::Const(b) => Predicate::Const(!b),
            other => Predicate::Not(Box::new(other)),
        },
        leaf => leaf,
    }
}

fn collapse(mut children: Vec<Predicate>, conjunction: bool) -> Predicate {
    match children.len() {
        0 => Predicate::Const(conjunction),
        1 => children.remove(0),
        _ if conjunction => Predicate::And(children),
        _ => Predicate::Or(children),
    }
}

// =============================================================================
// Access Path
// =============================================================================

/// How candidate documents are obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    FullScan,
    /// Documents whose indexed field equals one of `keys`.
    IndexLookup { field: String, keys: Vec<Value> },
    /// Documents whose indexed field lies in a range. When `ordered`, the
    /// index order is the result order and no sort is needed.
    IndexRange {
        field: String,
        lower: Bound<Value>,
        upper: Bound<Value>,
        ordered: bool,
        descending: bool,
    },
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullScan => write!(f, "full scan"),
            Self::IndexLookup { field, keys } => {
                write!(f, "index lookup on '{}' keys {}", field, Value::Array(keys.clone()))
            }
            Self::IndexRange {
                field,
                lower,
                upper,
                ordered,
                descending,
            } => {
                write!(f, "index range on '{}' ", field)?;
                match lower {
                    Bound::Included(v) => write!(f, "[{}", v)?,
                    Bound::Excluded(v) => write!(f, "({}", v)?,
                    Bound::Unbounded => write!(f, "(-inf")?,
                }
                write!(f, ", ")?;
                match upper {
                    Bound::Included(v) => write!(f, "{}]", v)?,
                    Bound::Excluded(v) => write!(f, "{})", v)?,
                    Bound::Unbounded => write!(f, "+inf)")?,
                }
                if *ordered {
                    write!(f, " ordered {}", if *descending { "desc" } else { "asc" })?;
                }
                Ok(())
            }
        }
    }
}

type Range = (Bound<Value>, Bound<Value>);

fn tighten_lower(current: Bound<Value>, candidate: Bound<Value>) -> Bound<Value> {
    if replaces(&current, &candidate, Ordering::Less) {
        candidate
    } else {
        current
    }
}

fn tighten_upper(current: Bound<Value>, candidate: Bound<Value>) -> Bound<Value> {
    if replaces(&current, &candidate, Ordering::Greater) {
        candidate
    } else {
        current
    }
}

/// Whether `candidate` is the tighter bound. `looser` is how the current
/// endpoint compares to the candidate when the current one admits more.
/// On equal endpoints an exclusive candidate wins.
fn replaces(current: &Bound<Value>, candidate: &Bound<Value>, looser: Ordering) -> bool {
    match (current, candidate) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
            match a.cmp(b) {
                Ordering::Equal => matches!(candidate, Bound::Excluded(_)),
                ord => ord == looser,
            }
        }
    }
}

fn choose_access(
    predicate: &Predicate,
    sort: &[SortKey],
    indexes: &BTreeMap<String, IndexType>,
) -> AccessPath {
    let conjuncts: Vec<&Predicate> = match predicate {
        Predicate::And(children) => children.iter().collect(),
        other => vec![other],
    };

    for conjunct in &conjuncts {
        match conjunct {
            Predicate::Compare {
                field,
                op: CompareOp::Eq,
                value,
            } if indexes.contains_key(field) && is_indexable(value) => {
                return AccessPath::IndexLookup {
                    field: field.clone(),
                    keys: vec![value.clone()],
                };
            }
            Predicate::In {
                field,
                values,
                negated: false,
            } if indexes.contains_key(field) && values.iter().all(is_indexable) => {
                let mut keys = values.clone();
                keys.sort();
                keys.dedup();
                return AccessPath::IndexLookup {
                    field: field.clone(),
                    keys,
                };
            }
            _ => {}
        }
    }

    let mut ranges: BTreeMap<&str, Range> = BTreeMap::new();
    for conjunct in &conjuncts {
        let Predicate::Compare { field, op, value } = conjunct else {
            continue;
        };
        if indexes.get(field) != Some(&IndexType::BTree) || !op.is_ordering() {
            continue;
        }
        let (lower, upper) = ranges
            .remove(field.as_str())
            .unwrap_or((Bound::Unbounded, Bound::Unbounded));
        let bounded = match op {
            CompareOp::Gt => (tighten_lower(lower, Bound::Excluded(value.clone())), upper),
            CompareOp::Gte => (tighten_lower(lower, Bound::Included(value.clone())), upper),
            CompareOp::Lt => (lower, tighten_upper(upper, Bound::Excluded(value.clone()))),
            CompareOp::Lte => (lower, tighten_upper(upper, Bound::Included(value.clone()))),
            CompareOp::Eq | CompareOp::Ne => (lower, upper),
        };
        ranges.insert(field.as_str(), bounded);
    }

    // Prefer the range that also delivers the requested order.
    let sort_field = match sort {
        [only] => Some(only),
        _ => None,
    };
    if let Some(key) = sort_field {
        if let Some((lower, upper)) = ranges.remove(key.field.as_str()) {
            return AccessPath::IndexRange {
                field: key.field.clone(),
                lower,
                upper,
                ordered: true,
                descending: key.order == SortOrder::Desc,
            };
        }
    }

    match ranges.into_iter().next() {
        Some((field, (lower, upper))) => AccessPath::IndexRange {
            field: field.to_string(),
            lower,
            upper,
            ordered: false,
            descending: false,
        },
        None => AccessPath::FullScan,
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Compiled form of a query against one collection.
#[derive(Debug, Clone)]
pub struct Plan {
    collection: String,
    predicate: Predicate,
    access: AccessPath,
    sort: Vec<SortKey>,
    skip: usize,
    limit: Option<usize>,
    projection: Option<Projection>,
}

impl Plan {
    /// Compile `query` for a collection with the given indexes.
    pub fn compile(
        collection: &str,
        query: &Query,
        indexes: &BTreeMap<String, IndexType>,
    ) -> Result<Self, QueryError> {
        let predicate = match &query.filter {
            Some(filter) => Predicate::compile(filter)?,
            None => Predicate::Const(true),
        };
        for key in &query.sort {
            check_field(&key.field)?;
        }
        if let Some(projection) = &query.projection {
            for field in projection.fields() {
                check_field(field)?;
            }
        }

        let access = if matches!(predicate, Predicate::Const(false)) {
            AccessPath::FullScan
        } else {
            choose_access(&predicate, &query.sort, indexes)
        };

        Ok(Self {
            collection: collection.to_string(),
            predicate,
            access,
            sort: query.sort.clone(),
            skip: query.skip,
            limit: query.limit,
            projection: query.projection.clone(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn access(&self) -> &AccessPath {
        &self.access
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    /// Whether matches must be materialized and sorted in memory.
    pub fn needs_sort(&self) -> bool {
        !self.sort.is_empty()
            && !matches!(self.access, AccessPath::IndexRange { ordered: true, .. })
    }

    /// Whether the plan can produce no documents at all.
    pub fn is_empty(&self) -> bool {
        matches!(self.predicate, Predicate::Const(false)) || self.limit == Some(0)
    }

    /// Describe the plan for humans.
    pub fn explain(&self) -> String {
        let mut out = format!("plan for collection '{}'\n", self.collection);
        out.push_str(&format!("  access: {}\n", self.access));
        out.push_str(&format!("  filter: {}\n", self.predicate));
        if self.sort.is_empty() {
            out.push_str("  sort: by _id\n");
        } else {
            let keys: Vec<String> = self
                .sort
                .iter()
                .map(|k| {
                    let order = match k.order {
                        SortOrder::Asc => "asc",
                        SortOrder::Desc => "desc",
                    };
                    format!("{} {}", k.field, order)
                })
                .collect();
            let mode = if self.needs_sort() { "in memory" } else { "from index" };
            out.push_str(&format!("  sort: {} ({})\n", keys.join(", "), mode));
        }
        let limit = self
            .limit
            .map_or_else(|| "none".to_string(), |l| l.to_string());
        out.push_str(&format!("  skip: {}, limit: {}\n", self.skip, limit));
        match &self.projection {
            Some(Projection::Include(fields)) => {
                out.push_str(&format!("  projection: include [{}]\n", fields.join(", ")))
            }
            Some(Projection::Exclude(fields)) => {
                out.push_str(&format!("  projection: exclude [{}]\n", fields.join(", ")))
            }
            None => {}
        }
        out
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}

/// Order documents by the sort keys, missing fields first, ties by
/// ascending identifier.
pub fn compare_documents(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.lookup(&key.field);
        let right = b.lookup(&key.field);
        let ord = match (left.as_deref(), right.as_deref()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => l.cmp(r),
        };
        let ord = match key.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

// =============================================================================
// Tests
// =============================================================================
