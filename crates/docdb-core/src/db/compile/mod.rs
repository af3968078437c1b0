//! Command resolution: turns accumulated operation state plus a terminal
//! intent into one compiled backend command.
//!
//! Resolution order is fixed: shape, predicate, ordering, paging, returning.
//! Binds are recorded as their placeholders are written.

mod predicate;
mod select;
mod write;

pub(crate) use select::{compile_explain, compile_key_batch, compile_plan_display, compile_read};
pub(crate) use write::{
    compile_insert, compile_remove, compile_replace, compile_transform_update, compile_upsert,
};

use crate::{
    config::{CollectionConfig, ContentSqlType, KeySqlType},
    db::{
        backend::{BindValue, Capabilities},
        compiled::{BindRole, OutputType, ResultColumn, ReturnedColumn, Returning},
        operation::{OperationState, Selector, TerminalIntent},
        sql::{SqlWriter, quote_ident},
    },
    error::{Error, ErrorOrigin},
    filter::{CompiledFilter, FilterCompiler, FilterContext, FilterError},
    key::{Key, KeyCodec},
    patch::{ContentTransform, TransformKind},
    settings::CompilerSettings,
};

///
/// CompileContext
///
/// Everything resolution reads besides the operation state. Capabilities
/// are negotiated once per collection handle and passed in explicitly.
///

#[derive(Clone, Copy)]
pub(crate) struct CompileContext<'a> {
    pub(crate) config: &'a CollectionConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) settings: &'a CompilerSettings,
    pub(crate) filters: &'a dyn FilterCompiler,
}

impl CompileContext<'_> {
    /// Filters use strict path semantics unless relaxed ones are both
    /// available and allowed.
    pub(crate) const fn strict_filters(&self) -> bool {
        self.settings.strict_filters || !self.capabilities.relaxed_filters
    }

    fn key_column(&self) -> String {
        quote_ident(&self.config.key().name)
    }

    fn content_column(&self) -> String {
        quote_ident(&self.config.content().name)
    }
}

///
/// ResolvedFilter
/// A compiled filter with its `$id` keys canonicalized.
///

#[derive(Debug, Default)]
pub(crate) struct ResolvedFilter {
    pub(crate) compiled: CompiledFilter,
    pub(crate) keys: Vec<Key>,
}

/// Compile the state's filter and enforce the clause policy for `intent`.
pub(crate) fn resolve_filter(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    intent: TerminalIntent,
) -> Result<Option<ResolvedFilter>, Error> {
    let Some(filter) = state.filter.as_ref() else {
        return Ok(None);
    };

    let context = FilterContext {
        content_column: &ctx.config.content().name,
        key_column: &ctx.config.key().name,
        strict: ctx.strict_filters(),
    };
    let compiled = ctx.filters.compile(filter, &context)?;

    if compiled.uses_unsupported_clauses() {
        return Err(FilterError::UnsupportedClause {
            clauses: compiled.unsupported_clauses,
        }
        .into());
    }

    let mut keys = Vec::new();
    if compiled.has_literal_keys() && !state.suppress_filter_keys {
        let pattern_selector = matches!(state.selector, Some(Selector::Like(_)));
        if intent.is_single_document_write() || pattern_selector {
            return Err(FilterError::IdClauseNotAllowed.into());
        }
        keys = KeyCodec::new(ctx.config.key()).canonicalize_all(&compiled.literal_keys)?;
    }

    Ok(Some(ResolvedFilter { compiled, keys }))
}

/// Content bind for the collection's storage type.
pub(crate) fn content_bind(config: &CollectionConfig, content: &[u8]) -> Result<BindValue, Error> {
    match config.content().sql_type {
        ContentSqlType::Blob => Ok(BindValue::Bytes(content.to_vec())),
        ContentSqlType::Clob | ContentSqlType::Varchar | ContentSqlType::Json => {
            String::from_utf8(content.to_vec())
                .map(BindValue::Text)
                .map_err(|_| {
                    Error::invalid_argument(
                        ErrorOrigin::Operation,
                        "text content columns require UTF-8 documents",
                    )
                })
        }
    }
}

/// Backend expression computing transformed content, binding the spec.
pub(crate) fn push_transform(
    sql: &mut SqlWriter,
    ctx: &CompileContext<'_>,
    alias: Option<&str>,
    transform: &ContentTransform,
) {
    let column = qualify(alias, &ctx.content_column());
    let returning = ctx.config.content().sql_type.returning_type();
    let spec = String::from_utf8_lossy(transform.spec()).into_owned();

    match transform.kind() {
        TransformKind::Merge => {
            sql.push(&format!("JSON_MERGEPATCH({column}, "));
        }
        TransformKind::Patch => {
            sql.push(&format!("JSON_TRANSFORM({column}, PATCH "));
        }
    }
    sql.push_bind(BindRole::Transform, BindValue::Text(spec))
        .push(&format!(" RETURNING {returning})"));
}

/// Optimizer hint comment, with a trailing space.
pub(crate) fn hint_comment(state: &OperationState) -> String {
    state
        .hint
        .as_ref()
        .map(|hint| format!("/*+ {hint} */ "))
        .unwrap_or_default()
}

/// Header columns a write must hand back, in result order.
pub(crate) fn returned_columns(
    config: &CollectionConfig,
    include_key: bool,
    include_version: bool,
) -> Vec<ReturnedColumn> {
    let mut out = Vec::new();
    let mut push = |column, name: &str, sql_type| {
        out.push(ReturnedColumn {
            column,
            name: name.to_string(),
            sql_type,
        });
    };

    if include_key {
        let sql_type = match config.key().sql_type {
            KeySqlType::Varchar => OutputType::Text,
            KeySqlType::Number => OutputType::Number,
            KeySqlType::Raw => OutputType::Raw,
        };
        push(ResultColumn::Key, &config.key().name, sql_type);
    }
    if let Some(column) = config.last_modified() {
        push(ResultColumn::LastModified, column, OutputType::Timestamp);
    }
    if let Some(column) = config.created_on() {
        push(ResultColumn::CreatedOn, column, OutputType::Timestamp);
    }
    if include_version && let Some(column) = config.version() {
        push(ResultColumn::Version, &column.name, OutputType::Text);
    }

    out
}

/// Attach returned columns to a write: natively, or through an anonymous
/// block with declared output slots.
pub(crate) fn finish_returning(
    ctx: &CompileContext<'_>,
    command: String,
    columns: &[ReturnedColumn],
) -> (String, Returning) {
    if columns.is_empty() {
        return (command, Returning::None);
    }

    if ctx.capabilities.returning_clause {
        return (command, Returning::Generated(columns.to_vec()));
    }

    let names: Vec<String> = columns
        .iter()
        .map(|returned| quote_ident(&returned.name))
        .collect();
    let slots = vec!["?"; columns.len()];
    let wrapped = format!(
        "BEGIN {command} RETURNING {} INTO {}; END;",
        names.join(", "),
        slots.join(", ")
    );
    (wrapped, Returning::OutputSlots(columns.to_vec()))
}

fn qualify(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{alias}.{column}"),
        None => column.to_string(),
    }
}
