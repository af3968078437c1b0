use crate::{
    config::KeySqlType,
    db::{
        backend::BindValue,
        compile::{CompileContext, ResolvedFilter},
        compiled::{Bind, BindRole},
        operation::{OperationState, Selector, TimeConstraint},
        sql::{Fragment, quote_ident},
    },
    key::Key,
};

/// Assemble the predicate in its fixed order: selector, filter keys, time,
/// version precondition, filter predicate.
pub(super) fn where_clause(
    ctx: &CompileContext<'_>,
    state: &OperationState,
    filter: Option<&ResolvedFilter>,
) -> Option<Fragment> {
    let mut clauses = Vec::new();

    let selector = state
        .selector
        .as_ref()
        .map(|selector| selector_clause(ctx, selector));
    let filter_keys = filter
        .filter(|resolved| !resolved.keys.is_empty() && !state.suppress_filter_keys)
        .map(|resolved| key_set_clause(ctx, &resolved.keys));

    match (selector, filter_keys) {
        // key-shaped selectors widen with the filter's keys
        (Some(selector), Some(keys))
            if matches!(state.selector, Some(Selector::Key(_) | Selector::Keys(_))) =>
        {
            clauses
                .extend(Fragment::join(vec![selector, keys], " OR ").map(Fragment::parenthesized));
        }
        (selector, keys) => {
            clauses.extend(selector);
            clauses.extend(keys);
        }
    }

    clauses.extend(time_clauses(ctx, state));

    if let (Some(version), Some(column)) = (state.version.as_ref(), ctx.config.version()) {
        clauses.push(Fragment::with_binds(
            format!("{} = ?", quote_ident(&column.name)),
            vec![Bind {
                role: BindRole::Version,
                value: BindValue::Text(version.clone()),
            }],
        ));
    }

    if let Some(resolved) = filter
        && let Some(predicate) = resolved.compiled.predicate.as_ref()
    {
        let binds = resolved
            .compiled
            .binds
            .iter()
            .map(|value| Bind {
                role: BindRole::Filter,
                value: value.clone(),
            })
            .collect();
        clauses.push(Fragment::with_binds(format!("({predicate})"), binds));
    }

    Fragment::join(clauses, " AND ")
}

fn selector_clause(ctx: &CompileContext<'_>, selector: &Selector) -> Fragment {
    let column = ctx.key_column();
    let key_type = ctx.config.key().sql_type;

    match selector {
        Selector::Key(key) => Fragment::with_binds(
            format!("{column} = ?"),
            vec![key_bind(key, key_type)],
        ),
        Selector::Keys(keys) => key_set_clause(ctx, keys),
        Selector::Range(range) => {
            let op = match (range.ascending, range.inclusive) {
                (true, true) => ">=",
                (true, false) => ">",
                (false, true) => "<=",
                (false, false) => "<",
            };
            Fragment::with_binds(
                format!("{column} {op} ?"),
                vec![key_bind(&range.start, key_type)],
            )
        }
        Selector::Like(pattern) => {
            let mut binds = vec![Bind {
                role: BindRole::Key,
                value: BindValue::Text(pattern.pattern.clone()),
            }];
            let mut text = format!("{column} LIKE ?");
            if let Some(escape) = pattern.escape {
                text.push_str(" ESCAPE ?");
                binds.push(Bind {
                    role: BindRole::Key,
                    value: BindValue::Text(escape.to_string()),
                });
            }
            Fragment::with_binds(text, binds)
        }
    }
}

/// `IN` groups of at most `in_list_chunk` keys, combined with `OR`.
fn key_set_clause(ctx: &CompileContext<'_>, keys: &[Key]) -> Fragment {
    let column = ctx.key_column();
    let key_type = ctx.config.key().sql_type;

    let groups: Vec<Fragment> = keys
        .chunks(ctx.settings.in_list_chunk.max(1))
        .map(|chunk| {
            let slots = vec!["?"; chunk.len()].join(", ");
            Fragment::with_binds(
                format!("{column} IN ({slots})"),
                chunk.iter().map(|key| key_bind(key, key_type)).collect(),
            )
        })
        .collect();

    let multiple = groups.len() > 1;
    let joined = Fragment::join(groups, " OR ").unwrap_or_else(|| Fragment::new("1 = 0"));
    if multiple {
        joined.parenthesized()
    } else {
        joined
    }
}

fn time_clauses(ctx: &CompileContext<'_>, state: &OperationState) -> Vec<Fragment> {
    let (Some(constraint), Some(column)) = (state.time.as_ref(), ctx.config.last_modified()) else {
        return Vec::new();
    };
    let column = quote_ident(column);
    let compare = |op: &str, timestamp: &String| {
        Fragment::with_binds(
            format!("{column} {op} TO_UTC_TIMESTAMP_TZ(?)"),
            vec![Bind {
                role: BindRole::Timestamp,
                value: BindValue::Text(timestamp.clone()),
            }],
        )
    };

    match constraint {
        TimeConstraint::LastModified(timestamp) => vec![compare("=", timestamp)],
        TimeConstraint::Range {
            since,
            until,
            inclusive,
        } => {
            let mut out = Vec::with_capacity(2);
            out.extend(since.as_ref().map(|since| compare(">", since)));
            out.extend(
                until
                    .as_ref()
                    .map(|until| compare(if *inclusive { "<=" } else { "<" }, until)),
            );
            out
        }
    }
}

fn key_bind(key: &Key, key_type: KeySqlType) -> Bind {
    Bind {
        role: BindRole::Key,
        value: key.bind_value(key_type),
    }
}
