use crate::{filter::json_path, key::Key, patch::ContentTransform};
use serde_json::Value;

///
/// Selector
///
/// Which documents an operation targets. At most one is active; setting a
/// new one replaces the old.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selector {
    Key(Key),
    Keys(Vec<Key>),
    Range(KeyRange),
    Like(KeyPattern),
}

impl Selector {
    #[must_use]
    pub const fn kind(&self) -> SelectorKind {
        match self {
            Self::Key(_) => SelectorKind::Key,
            Self::Keys(_) => SelectorKind::Keys,
            Self::Range(_) => SelectorKind::Range,
            Self::Like(_) => SelectorKind::Like,
        }
    }
}

///
/// SelectorKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectorKind {
    Key,
    Keys,
    Range,
    Like,
}

///
/// KeyRange
/// Keys from `start` onward in the given direction.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyRange {
    pub start: Key,
    pub ascending: bool,
    pub inclusive: bool,
}

///
/// KeyPattern
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPattern {
    pub pattern: String,
    pub escape: Option<char>,
}

///
/// KeyOrder
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum KeyOrder {
    /// Ordered only when paging needs it.
    #[default]
    Unrequested,
    Ascending,
    Descending,
}

///
/// TimeConstraint
/// Last-modified precondition or range; one replaces the other.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TimeConstraint {
    LastModified(String),
    Range {
        since: Option<String>,
        until: Option<String>,
        inclusive: bool,
    },
}

///
/// AsOf
/// Point-in-time read marker.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AsOf {
    Scn(u64),
    Timestamp(String),
}

///
/// Projection
/// Content shaping for reads; a spec and header-only replace each other.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Projection {
    Spec(ProjectionSpec),
    HeaderOnly,
}

///
/// ProjectionSpec
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectionSpec {
    /// Rendered JSON paths (`$.a.b`).
    pub(crate) paths: Vec<String>,
    pub(crate) include: bool,
}

impl ProjectionSpec {
    /// Parse `{"path": true|false|1|0, ...}`. All entries must agree.
    pub(crate) fn parse(spec: &Value) -> Result<Self, String> {
        let Value::Object(members) = spec else {
            return Err("projection must be an object".to_string());
        };
        if members.is_empty() {
            return Err("projection must name at least one path".to_string());
        }

        let mut include = None;
        let mut paths = Vec::with_capacity(members.len());
        for (path, flag) in members {
            let keep = match flag {
                Value::Bool(keep) => *keep,
                Value::Number(n) if n.as_i64() == Some(1) => true,
                Value::Number(n) if n.as_i64() == Some(0) => false,
                _ => return Err(format!("'{path}' must be true, false, 1 or 0")),
            };
            if include.is_some_and(|expected| expected != keep) {
                return Err("projection cannot mix included and excluded paths".to_string());
            }
            include = Some(keep);
            paths.push(json_path(path).map_err(|err| err.to_string())?);
        }

        Ok(Self {
            paths,
            include: include.unwrap_or(true),
        })
    }

    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    #[must_use]
    pub const fn is_include(&self) -> bool {
        self.include
    }
}

///
/// OperationState
///
/// Everything a fluent chain has accumulated before its terminal call.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct OperationState {
    pub(crate) selector: Option<Selector>,
    pub(crate) key_order: KeyOrder,
    pub(crate) filter: Option<Value>,
    /// Skip the filter's `$id` key clause (patch replace-back).
    pub(crate) suppress_filter_keys: bool,
    pub(crate) version: Option<String>,
    pub(crate) time: Option<TimeConstraint>,
    pub(crate) as_of: Option<AsOf>,
    pub(crate) lock: bool,
    pub(crate) projection: Option<Projection>,
    pub(crate) limit: Option<u32>,
    pub(crate) skip: Option<u64>,
    pub(crate) hint: Option<String>,
}

impl OperationState {
    pub(crate) fn set_selector(&mut self, selector: Selector) {
        self.selector = Some(selector);
        self.key_order = KeyOrder::Unrequested;
        self.suppress_filter_keys = false;
    }

    pub(crate) fn is_single_key(&self) -> bool {
        matches!(self.selector, Some(Selector::Key(_)))
    }

    pub(crate) const fn is_paged(&self) -> bool {
        self.skip.is_some() || self.limit.is_some()
    }

    pub(crate) const fn is_header_only(&self) -> bool {
        matches!(self.projection, Some(Projection::HeaderOnly))
    }

    /// State for replacing one candidate found by a patch select.
    pub(crate) fn replace_back(&self, key: Key, version: Option<String>) -> Self {
        let mut state = self.clone();
        state.set_selector(Selector::Key(key));
        state.suppress_filter_keys = true;
        state.version = version;

        state
    }
}

///
/// ReadContent
/// What a select emits in the content position.
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum ReadContent<'a> {
    Stored,
    Transformed(&'a ContentTransform),
}
