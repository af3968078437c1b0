//! Command text assembly.
//!
//! Placeholders are positional `?`; every placeholder pushed through
//! [`SqlWriter::push_bind`] records its bind at the same position.

use crate::{
    config::CollectionConfig,
    db::{
        backend::BindValue,
        compiled::{Bind, BindRole},
    },
};

/// Quote one identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualified collection object name.
pub(crate) fn qualified_table(config: &CollectionConfig) -> String {
    match config.schema() {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(config.table())),
        None => quote_ident(config.table()),
    }
}

///
/// Fragment
///
/// A piece of command text with the binds for its placeholders.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Fragment {
    pub(crate) text: String,
    pub(crate) binds: Vec<Bind>,
}

impl Fragment {
    pub(crate) fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            binds: Vec::new(),
        }
    }

    pub(crate) fn with_binds(text: impl Into<String>, binds: Vec<Bind>) -> Self {
        Self {
            text: text.into(),
            binds,
        }
    }

    /// Join fragments with a separator, keeping bind order.
    pub(crate) fn join(parts: Vec<Self>, separator: &str) -> Option<Self> {
        let mut iter = parts.into_iter();
        let mut out = iter.next()?;
        for part in iter {
            out.text.push_str(separator);
            out.text.push_str(&part.text);
            out.binds.extend(part.binds);
        }

        Some(out)
    }

    #[must_use]
    pub(crate) fn parenthesized(self) -> Self {
        Self {
            text: format!("({})", self.text),
            binds: self.binds,
        }
    }
}

///
/// SqlWriter
///

#[derive(Debug, Default)]
pub(crate) struct SqlWriter {
    text: String,
    binds: Vec<Bind>,
}

impl SqlWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    pub(crate) fn push_bind(&mut self, role: BindRole, value: BindValue) -> &mut Self {
        self.text.push('?');
        self.binds.push(Bind { role, value });
        self
    }

    pub(crate) fn push_fragment(&mut self, fragment: Fragment) -> &mut Self {
        self.text.push_str(&fragment.text);
        self.binds.extend(fragment.binds);
        self
    }

    pub(crate) fn finish(self) -> (String, Vec<Bind>) {
        (self.text, self.binds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_double_embedded_quotes() {
        assert_eq!(quote_ident("ID"), "\"ID\"");
        assert_eq!(quote_ident("A\"B"), "\"A\"\"B\"");
    }

    #[test]
    fn fragments_keep_bind_order_when_joined() {
        let left = Fragment::with_binds(
            "\"A\" = ?",
            vec![Bind {
                role: BindRole::Key,
                value: BindValue::Text("1".to_string()),
            }],
        );
        let right = Fragment::with_binds(
            "\"B\" = ?",
            vec![Bind {
                role: BindRole::Version,
                value: BindValue::Text("2".to_string()),
            }],
        );

        let joined = Fragment::join(vec![left, right], " OR ")
            .expect("non-empty")
            .parenthesized();

        assert_eq!(joined.text, "(\"A\" = ? OR \"B\" = ?)");
        assert_eq!(joined.binds[0].role, BindRole::Key);
        assert_eq!(joined.binds[1].role, BindRole::Version);
    }
}
