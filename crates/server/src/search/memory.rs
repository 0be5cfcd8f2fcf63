// In-process search index. Evaluates the query DSL subset produced by the filter compiler.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{
    Hit, IndexDocument, IndexError, IndexManager, SearchBody, SearchContext, SearchIndex,
    SearchResults, SortOrder,
};

const DEFAULT_SIZE: u64 = 10;

#[derive(Default)]
struct State {
    indices: HashMap<String, Vec<Hit>>,
    aliases: HashMap<String, String>,
    contexts: HashMap<String, Vec<Hit>>,
}

impl State {
    fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }
}

#[derive(Default)]
pub struct MemorySearchIndex {
    state: RwLock<State>,
    next_context: AtomicU64,
    searches: AtomicU64,
    ensured: AtomicU64,
    unavailable: AtomicBool,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document, addressed by index or alias name.
    pub async fn insert(&self, index: &str, id: impl Into<String>, source: Value) {
        let mut state = self.state.write().await;
        let index = state.resolve(index).to_string();
        let documents = state.indices.entry(index).or_default();
        let id = id.into();
        match documents.iter_mut().find(|hit| hit.id == id) {
            Some(existing) => existing.source = source,
            None => documents.push(Hit { id, source }),
        }
    }

    pub async fn documents(&self, index: &str) -> Vec<Hit> {
        let state = self.state.read().await;
        state.indices.get(state.resolve(index)).cloned().unwrap_or_default()
    }

    pub async fn close_search_context(&self, id: &str) -> bool {
        self.state.write().await.contexts.remove(id).is_some()
    }

    pub async fn alias_target(&self, alias: &str) -> Option<String> {
        self.state.read().await.aliases.get(alias).cloned()
    }

    /// Make every call fail with a 503 until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    pub fn contexts_opened(&self) -> u64 {
        self.next_context.load(AtomicOrdering::SeqCst)
    }

    pub fn searches(&self) -> u64 {
        self.searches.load(AtomicOrdering::SeqCst)
    }

    pub fn indices_ensured(&self) -> u64 {
        self.ensured.load(AtomicOrdering::SeqCst)
    }

    fn check_available(&self) -> Result<(), IndexError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(IndexError::Status {
                status: 503,
                body: "search index unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn search(&self, index: &str, body: &SearchBody) -> Result<SearchResults, IndexError> {
        self.check_available()?;
        self.searches.fetch_add(1, AtomicOrdering::SeqCst);

        let state = self.state.read().await;
        let (documents, context_id) = match &body.pit {
            Some(pit) => match state.contexts.get(&pit.id) {
                Some(snapshot) => (snapshot.as_slice(), Some(pit.id.clone())),
                None => {
                    return Err(IndexError::Status {
                        status: 404,
                        body: format!("search_context_missing_exception: {}", pit.id),
                    })
                }
            },
            None => (
                state.indices.get(state.resolve(index)).map(Vec::as_slice).unwrap_or_default(),
                None,
            ),
        };

        let mut matched = Vec::new();
        for hit in documents {
            let included = match &body.query {
                Some(query) => matches(query, &hit.source)?,
                None => true,
            };
            if included {
                matched.push(hit.clone());
            }
        }

        for sort in body.sort.iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = compare_fields(&a.source, &b.source, &sort.field);
                match sort.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(collapse) = &body.collapse {
            let mut seen = HashSet::new();
            matched.retain(|hit| {
                let key = field_values(&hit.source, &collapse.field)
                    .first()
                    .map(|value| value.to_string())
                    .unwrap_or_default();
                seen.insert(key)
            });
        }

        let total = matched.len() as u64;
        let from = body.from.unwrap_or(0) as usize;
        let size = body.size.unwrap_or(DEFAULT_SIZE) as usize;
        let hits = matched.into_iter().skip(from).take(size).collect();

        Ok(SearchResults { hits, total, approximate_total: false, context_id })
    }

    async fn open_search_context(
        &self,
        index: &str,
        _keep_alive: &str,
    ) -> Result<SearchContext, IndexError> {
        self.check_available()?;

        let mut state = self.state.write().await;
        let snapshot = state.indices.get(state.resolve(index)).cloned().unwrap_or_default();
        let id = format!("ctx-{}", self.next_context.fetch_add(1, AtomicOrdering::SeqCst) + 1);
        state.contexts.insert(id.clone(), snapshot);
        Ok(SearchContext { id })
    }

    async fn bulk_create(
        &self,
        index: &str,
        documents: Vec<IndexDocument>,
    ) -> Result<(), IndexError> {
        self.check_available()?;

        let mut state = self.state.write().await;
        let index = state.resolve(index).to_string();
        let existing = state.indices.entry(index).or_default();
        for document in documents {
            if existing.iter().all(|hit| hit.id != document.id) {
                existing.push(Hit { id: document.id, source: document.source });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexManager for MemorySearchIndex {
    fn index_name(&self, kind: &str) -> String {
        format!("{kind}-v1")
    }

    fn alias_name(&self, kind: &str) -> String {
        kind.to_string()
    }

    async fn ensure_index(&self, index: &str, alias: &str, _kind: &str) -> Result<(), IndexError> {
        self.check_available()?;
        self.ensured.fetch_add(1, AtomicOrdering::SeqCst);

        let mut state = self.state.write().await;
        state.indices.entry(index.to_string()).or_default();
        state.aliases.insert(alias.to_string(), index.to_string());
        Ok(())
    }
}

/// Evaluate a query DSL clause against a document source.
pub fn matches(query: &Value, document: &Value) -> Result<bool, IndexError> {
    let Some((clause, body)) = single_entry(query) else {
        return Err(unsupported(query));
    };

    match clause {
        "match_all" => Ok(true),
        "term" => {
            let (field, expected) = single_entry(body).ok_or_else(|| unsupported(query))?;
            Ok(field_values(document, field).iter().any(|value| values_equal(value, expected)))
        }
        "prefix" => {
            let (field, prefix) = single_entry(body).ok_or_else(|| unsupported(query))?;
            let prefix = prefix.as_str().ok_or_else(|| unsupported(query))?;
            Ok(field_values(document, field)
                .iter()
                .any(|value| value.as_str().is_some_and(|value| value.starts_with(prefix))))
        }
        "wildcard" => {
            let (field, pattern) = single_entry(body).ok_or_else(|| unsupported(query))?;
            let pattern = pattern
                .get("value")
                .unwrap_or(pattern)
                .as_str()
                .ok_or_else(|| unsupported(query))?;
            Ok(field_values(document, field)
                .iter()
                .any(|value| value.as_str().is_some_and(|value| wildcard_matches(pattern, value))))
        }
        "range" => {
            let (field, bounds) = single_entry(body).ok_or_else(|| unsupported(query))?;
            let bounds = bounds.as_object().ok_or_else(|| unsupported(query))?;
            Ok(field_values(document, field).iter().any(|value| {
                bounds.iter().all(|(op, bound)| {
                    let ordering = compare_values(value, bound);
                    match op.as_str() {
                        "lt" => ordering == Some(Ordering::Less),
                        "lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                        "gt" => ordering == Some(Ordering::Greater),
                        "gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                        _ => false,
                    }
                })
            }))
        }
        "nested" => {
            let path = body.get("path").and_then(Value::as_str).ok_or_else(|| unsupported(query))?;
            let inner = body.get("query").ok_or_else(|| unsupported(query))?;
            for element in field_values(document, path) {
                if matches(inner, &wrap(path, element.clone()))? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "bool" => bool_matches(body, document),
        _ => Err(unsupported(query)),
    }
}

fn bool_matches(body: &Value, document: &Value) -> Result<bool, IndexError> {
    let clauses = |name: &str| body.get(name).and_then(Value::as_array).cloned().unwrap_or_default();

    for clause in clauses("must").iter().chain(clauses("filter").iter()) {
        if !matches(clause, document)? {
            return Ok(false);
        }
    }
    for clause in &clauses("must_not") {
        if matches(clause, document)? {
            return Ok(false);
        }
    }

    let should = clauses("should");
    if should.is_empty() {
        return Ok(true);
    }
    let required = body.get("minimum_should_match").and_then(Value::as_u64).unwrap_or(1);
    let mut satisfied = 0;
    for clause in &should {
        if matches(clause, document)? {
            satisfied += 1;
        }
    }
    Ok(satisfied >= required)
}

fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.iter().next().map(|(key, value)| (key.as_str(), value))
}

fn unsupported(query: &Value) -> IndexError {
    IndexError::UnsupportedQuery(query.to_string())
}

/// All leaf values at a dotted path; arrays along the way are flattened.
fn field_values<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(object) => {
                    if let Some(child) = object.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.get(segment) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    current
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .collect()
}

fn wrap(path: &str, element: Value) -> Value {
    path.rsplit('.').fold(element, |inner, segment| {
        let mut object = Map::new();
        object.insert(segment.to_string(), inner);
        Value::Object(object)
    })
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Missing values sort after present ones.
fn compare_fields(a: &Value, b: &Value, field: &str) -> Ordering {
    match (field_values(a, field).first(), field_values(b, field).first()) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `*` matches any run, `?` one character, `\` escapes the next character.
fn wildcard_matches(pattern: &str, value: &str) -> bool {
    #[derive(Clone, Copy)]
    enum Piece {
        Any,
        One,
        Char(char),
    }

    let mut pieces = Vec::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        pieces.push(match ch {
            '*' => Piece::Any,
            '?' => Piece::One,
            '\\' => Piece::Char(chars.next().unwrap_or('\\')),
            other => Piece::Char(other),
        });
    }

    let value: Vec<char> = value.chars().collect();
    // reachable[j]: pattern prefix matched so far can end at value position j
    let mut reachable = vec![false; value.len() + 1];
    reachable[0] = true;
    for piece in pieces {
        let mut next = vec![false; value.len() + 1];
        for j in 0..=value.len() {
            match piece {
                Piece::Any => next[j] = reachable[j] || (j > 0 && next[j - 1]),
                Piece::One => next[j] = j > 0 && reachable[j - 1],
                Piece::Char(ch) => next[j] = j > 0 && reachable[j - 1] && value[j - 1] == ch,
            }
        }
        reachable = next;
    }
    reachable[value.len()]
}
