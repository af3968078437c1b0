use crate::{
    db::{
        backend::{ColumnValue, Row},
        compiled::{ResultColumn, ResultShape},
        document::Document,
    },
    error::Error,
};
use std::vec;

///
/// ResultCursor
///
/// Decodes the rows of one executed read using the result shape the
/// compiler recorded. Rows are fetched eagerly by the connection; decoding
/// is lazy.
///

#[derive(Debug)]
pub struct ResultCursor {
    rows: vec::IntoIter<Row>,
    shape: ResultShape,
}

impl ResultCursor {
    pub(crate) fn new(rows: Vec<Row>, shape: ResultShape) -> Self {
        Self {
            rows: rows.into_iter(),
            shape,
        }
    }

    #[must_use]
    pub const fn shape(&self) -> &ResultShape {
        &self.shape
    }

    /// Rows not yet decoded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for ResultCursor {
    type Item = Result<Document, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(decode_row(&self.shape, &row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// Decode one row into a document; columns absent from `shape` stay `None`.
pub(crate) fn decode_row(shape: &ResultShape, row: &Row) -> Result<Document, Error> {
    let mut document = Document::default();

    for (index, column) in shape.columns().iter().enumerate() {
        let value = row.get(index).ok_or_else(|| {
            Error::cursor_internal(format!(
                "row has {} columns, result shape expects {}",
                row.0.len(),
                shape.columns().len()
            ))
        })?;

        match column {
            ResultColumn::Key => {
                let key = header_text(value)
                    .ok_or_else(|| Error::cursor_internal("result row has a null key"))?;
                document.key = Some(key);
            }
            ResultColumn::Content => document.content = content_bytes(value),
            ResultColumn::MediaType => document.media_type = header_text(value),
            ResultColumn::LastModified => document.last_modified = header_text(value),
            ResultColumn::CreatedOn => document.created_on = header_text(value),
            ResultColumn::Version => document.version = header_text(value),
            ResultColumn::Count | ResultColumn::PlanLine => {}
        }
    }

    Ok(document)
}

/// Integer value of a single-column count row.
pub(crate) fn decode_count(shape: &ResultShape, rows: &[Row]) -> Result<u64, Error> {
    let index = shape
        .position(ResultColumn::Count)
        .ok_or_else(|| Error::cursor_internal("result shape has no count column"))?;
    let value = rows
        .first()
        .and_then(|row| row.get(index))
        .ok_or_else(|| Error::cursor_internal("count returned no rows"))?;

    match value {
        ColumnValue::Int(count) => u64::try_from(*count)
            .map_err(|_| Error::cursor_internal(format!("negative count {count}"))),
        ColumnValue::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| Error::cursor_internal(format!("count '{text}' is not an integer"))),
        ColumnValue::Null | ColumnValue::Bytes(_) => {
            Err(Error::cursor_internal("count column is not numeric"))
        }
    }
}

/// Text lines of a plan-display result.
pub(crate) fn decode_plan_lines(shape: &ResultShape, rows: &[Row]) -> Result<Vec<String>, Error> {
    let index = shape
        .position(ResultColumn::PlanLine)
        .ok_or_else(|| Error::cursor_internal("result shape has no plan column"))?;

    Ok(rows
        .iter()
        .filter_map(|row| row.get(index).and_then(header_text))
        .collect())
}

// Header columns arrive as text, integers, or raw bytes (RAW keys).
fn header_text(value: &ColumnValue) -> Option<String> {
    match value {
        ColumnValue::Null => None,
        ColumnValue::Text(text) => Some(text.clone()),
        ColumnValue::Int(value) => Some(value.to_string()),
        ColumnValue::Bytes(bytes) => Some(hex::encode_upper(bytes)),
    }
}

fn content_bytes(value: &ColumnValue) -> Option<Vec<u8>> {
    match value {
        ColumnValue::Null => None,
        ColumnValue::Text(text) => Some(text.as_bytes().to_vec()),
        ColumnValue::Bytes(bytes) => Some(bytes.clone()),
        ColumnValue::Int(value) => Some(value.to_string().into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn shape() -> ResultShape {
        ResultShape::new(vec![
            ResultColumn::Key,
            ResultColumn::Content,
            ResultColumn::LastModified,
            ResultColumn::Version,
        ])
    }

    #[test]
    fn rows_decode_by_shape_position() {
        let rows = vec![Row(vec![
            ColumnValue::Bytes(vec![0xAB, 0x01]),
            ColumnValue::Bytes(br#"{"v":1}"#.to_vec()),
            ColumnValue::Text("2024-01-01T00:00:00Z".to_string()),
            ColumnValue::Null,
        ])];

        let documents: Vec<Document> = ResultCursor::new(rows, shape())
            .collect::<Result<_, _>>()
            .expect("decoded");

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].key(), Some("AB01"));
        assert_eq!(documents[0].content_str(), Some(r#"{"v":1}"#));
        assert_eq!(documents[0].last_modified(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(documents[0].version(), None);
        assert_eq!(documents[0].media_type(), None);
    }

    #[test]
    fn short_rows_are_internal_errors() {
        let rows = vec![Row(vec![ColumnValue::Text("a".to_string())])];

        let err = ResultCursor::new(rows, shape())
            .next()
            .expect("one row")
            .expect_err("row is too short");

        assert_eq!(err.class, ErrorClass::Internal);
    }

    #[test]
    fn counts_accept_integer_and_text_columns() {
        let shape = ResultShape::new(vec![ResultColumn::Count]);

        let int = decode_count(&shape, &[Row(vec![ColumnValue::Int(7)])]).expect("int");
        let text =
            decode_count(&shape, &[Row(vec![ColumnValue::Text("12".to_string())])]).expect("text");

        assert_eq!((int, text), (7, 12));
        assert!(decode_count(&shape, &[]).is_err());
    }
}
