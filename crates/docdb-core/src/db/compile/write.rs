use crate::{
    config::VersionMethod,
    db::{
        backend::BindValue,
        compile::{
            CompileContext, content_bind, finish_returning, hint_comment, predicate::where_clause,
            push_transform, resolve_filter, returned_columns,
        },
        compiled::{
            Bind, BindRole, CommandShape, CompiledOperation, ResultShape, ReturnedColumn,
            Returning,
        },
        operation::{OperationState, TerminalIntent},
        payload::PreparedWrite,
        sql::{Fragment, SqlWriter, qualified_table, quote_ident},
    },
    error::Error,
    patch::ContentTransform,
    version::VersionBinding,
};

const NOW_UTC: &str = "SYS_EXTRACT_UTC(SYSTIMESTAMP)";

/// `DELETE` of every selected document.
pub(crate) fn compile_remove(
    ctx: &CompileContext<'_>,
    state: &OperationState,
) -> Result<CompiledOperation, Error> {
    let filter = resolve_filter(ctx, state, TerminalIntent::Remove)?;

    let mut sql = SqlWriter::new();
    sql.push("DELETE ")
        .push(&hint_comment(state))
        .push("FROM ")
        .push(&qualified_table(ctx.config));
    if let Some(predicate) = where_clause(ctx, state, filter.as_ref()) {
        sql.push(" WHERE ").push_fragment(predicate);
    }
    let (command, binds) = sql.finish();

    Ok(CompiledOperation::new(
        CommandShape::Delete,
        command,
        binds,
        ResultShape::default(),
    ))
}

/// Single-key `UPDATE` writing a client-prepared payload.
pub(crate) fn compile_replace(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    write: &PreparedWrite,
    and_get: bool,
) -> Result<CompiledOperation, Error> {
    let intent = if and_get {
        TerminalIntent::ReplaceAndGet
    } else {
        TerminalIntent::Replace
    };
    let filter = resolve_filter(ctx, state, intent)?;

    let mut sql = SqlWriter::new();
    sql.push("UPDATE ")
        .push(&hint_comment(state))
        .push(&qualified_table(ctx.config))
        .push(" SET ")
        .push(&ctx.content_column())
        .push(" = ")
        .push_bind(BindRole::Content, content_bind(ctx.config, &write.content)?);
    push_update_headers(&mut sql, ctx, &write.version, write.media_type.as_deref(), None);

    if let Some(predicate) = where_clause(ctx, state, filter.as_ref()) {
        sql.push(" WHERE ").push_fragment(predicate);
    }

    Ok(finish_write(
        ctx,
        CommandShape::Update,
        sql,
        and_get.then(|| returned_columns(ctx.config, false, write.version.is_backend())),
    ))
}

/// `UPDATE` whose new content the backend computes from a merge or patch
/// spec. Used when no client-side payload work is needed.
pub(crate) fn compile_transform_update(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    transform: &ContentTransform,
    version: &VersionBinding,
    intent: TerminalIntent,
) -> Result<CompiledOperation, Error> {
    let filter = resolve_filter(ctx, state, intent)?;

    let mut sql = SqlWriter::new();
    sql.push("UPDATE ")
        .push(&hint_comment(state))
        .push(&qualified_table(ctx.config))
        .push(" SET ")
        .push(&ctx.content_column())
        .push(" = ");
    push_transform(&mut sql, ctx, None, transform);
    push_update_headers(&mut sql, ctx, version, None, None);

    if let Some(predicate) = where_clause(ctx, state, filter.as_ref()) {
        sql.push(" WHERE ").push_fragment(predicate);
    }

    Ok(finish_write(
        ctx,
        CommandShape::Update,
        sql,
        intent
            .returns_documents()
            .then(|| returned_columns(ctx.config, false, version.is_backend())),
    ))
}

/// `INSERT` of one prepared document.
pub(crate) fn compile_insert(
    ctx: &CompileContext<'_>,
    write: &PreparedWrite,
    and_get: bool,
) -> Result<CompiledOperation, Error> {
    let config = ctx.config;
    let key = write.key.as_ref().map(|key| {
        bind_fragment(BindRole::Key, key.bind_value(config.key().sql_type))
    });
    let (columns, values) = insert_values(ctx, write, key)?;

    let mut sql = SqlWriter::new();
    sql.push("INSERT INTO ")
        .push(&qualified_table(config))
        .push(" (")
        .push(&columns.join(", "))
        .push(") VALUES (");
    if let Some(values) = Fragment::join(values, ", ") {
        sql.push_fragment(values);
    }
    sql.push(")");

    Ok(finish_write(
        ctx,
        CommandShape::Insert,
        sql,
        and_get.then(|| returned_columns(config, write.key.is_none(), write.version.is_backend())),
    ))
}

/// `MERGE` upsert keyed on the prepared key.
pub(crate) fn compile_upsert(
    ctx: &CompileContext<'_>,
    write: &PreparedWrite,
) -> Result<CompiledOperation, Error> {
    let config = ctx.config;
    let key = write
        .key
        .as_ref()
        .ok_or_else(|| Error::operation_internal("upsert requires a resolved key"))?;
    let key_column = ctx.key_column();
    let content_column = ctx.content_column();

    let mut sql = SqlWriter::new();
    sql.push("MERGE INTO ")
        .push(&qualified_table(config))
        .push(" t USING (SELECT ")
        .push_bind(BindRole::Key, key.bind_value(config.key().sql_type))
        .push(&format!(
            " {key_column} FROM DUAL) s ON (t.{key_column} = s.{key_column})"
        ))
        .push(&format!(" WHEN MATCHED THEN UPDATE SET t.{content_column} = "))
        .push_bind(BindRole::Content, content_bind(config, &write.content)?);
    push_update_headers(
        &mut sql,
        ctx,
        &write.version,
        write.media_type.as_deref(),
        Some("t"),
    );

    let (columns, values) =
        insert_values(ctx, write, Some(Fragment::new(format!("s.{key_column}"))))?;
    sql.push(" WHEN NOT MATCHED THEN INSERT (")
        .push(&columns.join(", "))
        .push(") VALUES (");
    if let Some(values) = Fragment::join(values, ", ") {
        sql.push_fragment(values);
    }
    sql.push(")");

    Ok(finish_write(ctx, CommandShape::Upsert, sql, None))
}

// Column list and values for a new row: key, content, version, timestamps,
// media type.
fn insert_values(
    ctx: &CompileContext<'_>,
    write: &PreparedWrite,
    key: Option<Fragment>,
) -> Result<(Vec<String>, Vec<Fragment>), Error> {
    let config = ctx.config;
    let mut columns = Vec::new();
    let mut values = Vec::new();

    if let Some(key) = key {
        columns.push(ctx.key_column());
        values.push(key);
    }
    columns.push(ctx.content_column());
    values.push(bind_fragment(
        BindRole::Content,
        content_bind(config, &write.content)?,
    ));

    if let Some(column) = config.version()
        && let Some(value) = inserted_version(&write.version)
    {
        columns.push(quote_ident(&column.name));
        values.push(value);
    }
    for column in [config.last_modified(), config.created_on()]
        .into_iter()
        .flatten()
    {
        columns.push(quote_ident(column));
        values.push(Fragment::new(NOW_UTC));
    }
    if let (Some(column), Some(media_type)) = (config.media_type(), write.media_type.as_ref()) {
        columns.push(quote_ident(column));
        values.push(bind_fragment(
            BindRole::MediaType,
            BindValue::Text(media_type.clone()),
        ));
    }

    Ok((columns, values))
}

// `SET` items after content: version, last-modified, media type.
fn push_update_headers(
    sql: &mut SqlWriter,
    ctx: &CompileContext<'_>,
    version: &VersionBinding,
    media_type: Option<&str>,
    alias: Option<&str>,
) {
    let config = ctx.config;
    let column = |name: &str| match alias {
        Some(alias) => format!("{alias}.{}", quote_ident(name)),
        None => quote_ident(name),
    };

    if let Some(version_column) = config.version() {
        let target = column(&version_column.name);
        match version {
            VersionBinding::Bound(token) => {
                sql.push(&format!(", {target} = "))
                    .push_bind(BindRole::Version, BindValue::Text(token.clone()));
            }
            VersionBinding::Backend(VersionMethod::Sequential) => {
                sql.push(&format!(", {target} = {target} + 1"));
            }
            VersionBinding::Backend(VersionMethod::Uuid) => {
                sql.push(&format!(", {target} = RAWTOHEX(SYS_GUID())"));
            }
            VersionBinding::Backend(_) | VersionBinding::Absent => {}
        }
    }
    if let Some(last_modified) = config.last_modified() {
        sql.push(&format!(", {} = {NOW_UTC}", column(last_modified)));
    }
    if let (Some(media_column), Some(media_type)) = (config.media_type(), media_type) {
        sql.push(&format!(", {} = ", column(media_column)))
            .push_bind(BindRole::MediaType, BindValue::Text(media_type.to_string()));
    }
}

// Version value for a new row; `None` when the column is left to the backend.
fn inserted_version(version: &VersionBinding) -> Option<Fragment> {
    match version {
        VersionBinding::Bound(token) => Some(bind_fragment(
            BindRole::Version,
            BindValue::Text(token.clone()),
        )),
        VersionBinding::Backend(VersionMethod::Sequential) => Some(Fragment::new("1")),
        VersionBinding::Backend(VersionMethod::Uuid) => {
            Some(Fragment::new("RAWTOHEX(SYS_GUID())"))
        }
        VersionBinding::Backend(_) | VersionBinding::Absent => None,
    }
}

fn bind_fragment(role: BindRole, value: BindValue) -> Fragment {
    Fragment::with_binds("?", vec![Bind { role, value }])
}

fn finish_write(
    ctx: &CompileContext<'_>,
    shape: CommandShape,
    sql: SqlWriter,
    returned: Option<Vec<ReturnedColumn>>,
) -> CompiledOperation {
    let (command, binds) = sql.finish();
    let (command, returning) = match returned {
        Some(columns) => finish_returning(ctx, command, &columns),
        None => (command, Returning::None),
    };

    CompiledOperation::new(shape, command, binds, ResultShape::default()).with_returning(returning)
}
