use crate::{
    config::KeyAssignment,
    db::{
        backend::BindValue,
        compile::{
            CompileContext, ResolvedFilter, hint_comment, predicate::where_clause, push_transform,
            qualify, resolve_filter,
        },
        compiled::{BindRole, CommandShape, CompiledOperation, ResultColumn, ResultShape},
        operation::{
            AsOf, ExplainLevel, KeyOrder, OperationState, Projection, ReadContent, Selector,
            TerminalIntent, TimeConstraint,
        },
        sql::{SqlWriter, qualified_table, quote_ident},
    },
    error::Error,
    key::{KeyError, assignment_label},
};

/// Compile a read: `Count`, or a row-producing select for anything else.
pub(crate) fn compile_read(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    intent: TerminalIntent,
    content: ReadContent<'_>,
) -> Result<CompiledOperation, Error> {
    let filter = resolve_filter(ctx, state, intent)?;
    if intent == TerminalIntent::Count {
        return Ok(compile_count(ctx, state, filter.as_ref()));
    }

    if is_paginated(state, filter.as_ref()) {
        return Ok(compile_paginated(ctx, state, content));
    }

    Ok(compile_select(ctx, state, filter.as_ref(), content))
}

/// Wrap the read shape in an explain-plan statement.
pub(crate) fn compile_explain(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    statement_id: &str,
) -> Result<CompiledOperation, Error> {
    let inner = compile_read(ctx, state, TerminalIntent::GetCursor, ReadContent::Stored)?;
    let command = format!(
        "EXPLAIN PLAN SET STATEMENT_ID = '{statement_id}' FOR {}",
        inner.command
    );

    Ok(CompiledOperation::new(
        CommandShape::Explain,
        command,
        inner.binds,
        ResultShape::default(),
    ))
}

/// Fetch the plan recorded under `statement_id`.
pub(crate) fn compile_plan_display(statement_id: &str, level: ExplainLevel) -> CompiledOperation {
    let mut sql = SqlWriter::new();
    sql.push("SELECT PLAN_TABLE_OUTPUT FROM TABLE(DBMS_XPLAN.DISPLAY('PLAN_TABLE', ")
        .push_bind(BindRole::Filter, BindValue::Text(statement_id.to_string()))
        .push(", ")
        .push_bind(BindRole::Filter, BindValue::Text(level.format().to_string()))
        .push("))");
    let (command, binds) = sql.finish();

    CompiledOperation::new(
        CommandShape::PlanDisplay,
        command,
        binds,
        ResultShape::new(vec![ResultColumn::PlanLine]),
    )
}

/// Fetch `count` backend-generated keys in one round trip.
pub(crate) fn compile_key_batch(
    ctx: &CompileContext<'_>,
    count: usize,
) -> Result<CompiledOperation, Error> {
    let source = match &ctx.config.key().assignment {
        KeyAssignment::Guid => "SYS_GUID()".to_string(),
        KeyAssignment::Sequence(name) => {
            let parts: Vec<String> = name.split('.').map(quote_ident).collect();
            format!("{}.NEXTVAL", parts.join("."))
        }
        other => {
            return Err(KeyError::GenerationUnsupported {
                assignment: assignment_label(other),
            }
            .into());
        }
    };

    let mut sql = SqlWriter::new();
    sql.push(&format!("SELECT {source} FROM DUAL CONNECT BY LEVEL <= "))
        .push_bind(
            BindRole::BatchSize,
            BindValue::Int(i64::try_from(count).unwrap_or(i64::MAX)),
        );
    let (command, binds) = sql.finish();

    Ok(CompiledOperation::new(
        CommandShape::KeyBatch,
        command,
        binds,
        ResultShape::new(vec![ResultColumn::Key]),
    ))
}

// Paging over a bare full-collection scan narrows keys first, then joins.
fn is_paginated(state: &OperationState, filter: Option<&ResolvedFilter>) -> bool {
    state.is_paged()
        && state.selector.is_none()
        && filter.is_none()
        && state.time.is_none()
        && state.version.is_none()
        && state.key_order == KeyOrder::Unrequested
        && state.as_of.is_none()
        && !state.lock
}

fn compile_count(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    filter: Option<&ResolvedFilter>,
) -> CompiledOperation {
    let mut sql = SqlWriter::new();
    sql.push("SELECT ")
        .push(&hint_comment(state))
        .push("COUNT(1) FROM ")
        .push(&qualified_table(ctx.config));
    push_as_of(&mut sql, state);
    if let Some(predicate) = where_clause(ctx, state, filter) {
        sql.push(" WHERE ").push_fragment(predicate);
    }
    let (command, binds) = sql.finish();

    CompiledOperation::new(
        CommandShape::Count,
        command,
        binds,
        ResultShape::new(vec![ResultColumn::Count]),
    )
}

fn compile_select(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    filter: Option<&ResolvedFilter>,
    content: ReadContent<'_>,
) -> CompiledOperation {
    let mut sql = SqlWriter::new();
    sql.push("SELECT ").push(&hint_comment(state));
    let result = push_columns(&mut sql, ctx, state, content, None);
    sql.push(" FROM ").push(&qualified_table(ctx.config));
    push_as_of(&mut sql, state);

    if let Some(predicate) = where_clause(ctx, state, filter) {
        sql.push(" WHERE ").push_fragment(predicate);
    }
    if let Some(order) = order_by(ctx, state, filter) {
        sql.push(" ORDER BY ").push(&order);
    }
    push_paging(&mut sql, state);
    if state.lock {
        sql.push(" FOR UPDATE");
    }
    let (command, binds) = sql.finish();

    CompiledOperation::new(CommandShape::Select, command, binds, result)
}

fn compile_paginated(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    content: ReadContent<'_>,
) -> CompiledOperation {
    let table = qualified_table(ctx.config);
    let key = ctx.key_column();

    let mut sql = SqlWriter::new();
    sql.push("SELECT ").push(&hint_comment(state));
    let result = push_columns(&mut sql, ctx, state, content, Some("t"));
    sql.push(&format!(" FROM {table} t, (SELECT {key} FROM {table} ORDER BY {key}"));
    push_paging(&mut sql, state);
    sql.push(&format!(") p WHERE t.{key} = p.{key} ORDER BY t.{key}"));
    let (command, binds) = sql.finish();

    CompiledOperation::new(CommandShape::PaginatedSelect, command, binds, result)
}

// Result columns in fixed order: key, content, media type, timestamps, version.
fn push_columns(
    sql: &mut SqlWriter,
    ctx: &CompileContext<'_>,
    state: &OperationState,
    content: ReadContent<'_>,
    alias: Option<&str>,
) -> ResultShape {
    let config = ctx.config;
    let mut columns = vec![ResultColumn::Key];
    sql.push(&qualify(alias, &ctx.key_column()));

    if !state.is_header_only() {
        sql.push(", ");
        columns.push(ResultColumn::Content);
        let column = qualify(alias, &ctx.content_column());
        match (content, state.projection.as_ref()) {
            (ReadContent::Transformed(transform), _) => push_transform(sql, ctx, alias, transform),
            (ReadContent::Stored, Some(Projection::Spec(spec))) => {
                let returning = config.content().sql_type.returning_type();
                let paths: Vec<String> =
                    spec.paths.iter().map(|path| format!("'{path}'")).collect();
                let operation = if spec.include {
                    format!("KEEP {}", paths.join(", "))
                } else {
                    paths
                        .iter()
                        .map(|path| format!("REMOVE {path}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                sql.push(&format!(
                    "JSON_TRANSFORM({column}, {operation} RETURNING {returning})"
                ));
            }
            (ReadContent::Stored, _) => {
                sql.push(&column);
            }
        }
    }

    let headers = [
        (ResultColumn::MediaType, config.media_type()),
        (ResultColumn::LastModified, config.last_modified()),
        (ResultColumn::CreatedOn, config.created_on()),
        (
            ResultColumn::Version,
            config.version().map(|column| column.name.as_str()),
        ),
    ];
    for (result, name) in headers {
        if let Some(name) = name {
            sql.push(", ").push(&qualify(alias, &quote_ident(name)));
            columns.push(result);
        }
    }

    ResultShape::new(columns)
}

fn push_as_of(sql: &mut SqlWriter, state: &OperationState) {
    match &state.as_of {
        Some(AsOf::Scn(scn)) => {
            sql.push(" AS OF SCN ")
                .push_bind(BindRole::AsOf, BindValue::Number(scn.to_string()));
        }
        Some(AsOf::Timestamp(timestamp)) => {
            sql.push(" AS OF TIMESTAMP TO_UTC_TIMESTAMP_TZ(")
                .push_bind(BindRole::AsOf, BindValue::Text(timestamp.clone()))
                .push(")");
        }
        None => {}
    }
}

fn order_by(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    filter: Option<&ResolvedFilter>,
) -> Option<String> {
    let key = ctx.key_column();
    let direction = |ascending: bool| if ascending { "ASC" } else { "DESC" };

    if let Some(Selector::Range(range)) = &state.selector {
        return Some(format!("{key} {}", direction(range.ascending)));
    }
    if let (Some(TimeConstraint::Range { .. }), Some(column)) =
        (&state.time, ctx.config.last_modified())
    {
        return Some(format!("{} ASC, {key} ASC", quote_ident(column)));
    }
    if let Some(ordering) = filter.and_then(|resolved| resolved.compiled.order_by.as_ref()) {
        return Some(if ordering.covers_key {
            ordering.fragment.clone()
        } else {
            format!("{}, {key} ASC", ordering.fragment)
        });
    }

    match state.key_order {
        KeyOrder::Ascending => Some(format!("{key} ASC")),
        KeyOrder::Descending => Some(format!("{key} DESC")),
        KeyOrder::Unrequested if state.is_paged() => Some(format!("{key} ASC")),
        KeyOrder::Unrequested => None,
    }
}

fn push_paging(sql: &mut SqlWriter, state: &OperationState) {
    if let Some(skip) = state.skip {
        sql.push(" OFFSET ")
            .push_bind(BindRole::Skip, BindValue::Number(skip.to_string()))
            .push(" ROWS");
    }
    if let Some(limit) = state.limit {
        sql.push(" FETCH NEXT ")
            .push_bind(BindRole::Limit, BindValue::Int(i64::from(limit)))
            .push(" ROWS ONLY");
    }
}
