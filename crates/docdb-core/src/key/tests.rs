use super::*;
use crate::config::{KeyAssignment, KeyColumn, KeySqlType};
use std::cell::Cell;

fn column(sql_type: KeySqlType, max_length: usize) -> KeyColumn {
    KeyColumn {
        name: "ID".to_string(),
        sql_type,
        max_length,
        assignment: KeyAssignment::Client,
    }
}

#[test]
fn varchar_keys_are_trimmed_and_length_checked() {
    let col = column(KeySqlType::Varchar, 4);
    let codec = KeyCodec::new(&col);

    assert_eq!(codec.canonicalize("  ab ").expect("valid").as_str(), "ab");
    assert_eq!(
        codec.canonicalize("abcde"),
        Err(KeyError::TooLong { max: 4, found: 5 })
    );
    assert_eq!(codec.canonicalize("   "), Err(KeyError::Empty));
}

#[test]
fn number_keys_are_canonical_integers() {
    let col = column(KeySqlType::Number, 38);
    let codec = KeyCodec::new(&col);

    assert_eq!(codec.canonicalize("+0042").expect("valid").as_str(), "42");
    assert_eq!(codec.canonicalize("-007").expect("valid").as_str(), "-7");
    assert_eq!(codec.canonicalize("-000").expect("valid").as_str(), "0");
    assert!(matches!(
        codec.canonicalize("4.2"),
        Err(KeyError::NotNumeric { .. })
    ));
    assert!(matches!(
        codec.canonicalize(&"9".repeat(39)),
        Err(KeyError::NotNumeric { .. })
    ));
}

#[test]
fn raw_keys_are_uppercase_hex_with_byte_length() {
    let col = column(KeySqlType::Raw, 2);
    let codec = KeyCodec::new(&col);

    assert_eq!(codec.canonicalize("beef").expect("valid").as_str(), "BEEF");
    assert!(matches!(
        codec.canonicalize("abc"),
        Err(KeyError::NotHex { .. })
    ));
    assert_eq!(
        codec.canonicalize("beefca"),
        Err(KeyError::TooLong { max: 2, found: 3 })
    );
}

#[test]
fn canonicalize_all_drops_duplicates_in_order() {
    let col = column(KeySqlType::Number, 38);
    let codec = KeyCodec::new(&col);

    let keys = codec
        .canonicalize_all(["3", "01", "1", "003", "2"])
        .expect("valid keys");
    let texts: Vec<&str> = keys.iter().map(Key::as_str).collect();

    assert_eq!(texts, ["3", "1", "2"]);
}

#[test]
fn raw_keys_bind_as_bytes() {
    let key = Key::from_canonical("BEEF".to_string());

    assert_eq!(
        key.bind_value(KeySqlType::Raw),
        BindValue::Bytes(vec![0xBE, 0xEF])
    );
    assert_eq!(
        key.bind_value(KeySqlType::Number),
        BindValue::Number("BEEF".to_string())
    );
}

#[test]
fn uuid_keys_are_32_uppercase_hex_digits() {
    let key = generate_uuid_key();

    assert_eq!(key.len(), 32);
    assert!(
        key.bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    );
}

#[test]
fn embedded_probe_finds_top_level_id_only() {
    let found = probe_embedded_key(br#"{"a":{"_id":"inner"},"_id":"outer"}"#).expect("object");
    let absent = probe_embedded_key(br#"{"a":{"_id":"inner"}}"#).expect("object");
    let numeric = probe_embedded_key(br#"{"_id":17}"#).expect("object");

    assert_eq!(found, EmbeddedKey::Present("outer".to_string()));
    assert_eq!(absent, EmbeddedKey::Absent);
    assert_eq!(numeric, EmbeddedKey::Present("17".to_string()));
}

#[test]
fn embedded_probe_rejects_non_objects_and_bad_ids() {
    assert!(matches!(
        probe_embedded_key(br#"["_id"]"#),
        Err(KeyError::BodyNotObject { .. })
    ));
    assert_eq!(
        probe_embedded_key(br#"{"_id":null}"#),
        Err(KeyError::InvalidEmbedded)
    );
    assert_eq!(
        probe_embedded_key(br#"{"_id":{"x":1}}"#),
        Err(KeyError::InvalidEmbedded)
    );
}

#[test]
fn injection_preserves_the_rest_of_the_body() {
    let injected = inject_embedded_key(br#"  {"b": [1, 2]}"#, "K1").expect("object body");
    let empty = inject_embedded_key(b"{ }", "K2").expect("object body");

    assert_eq!(injected, br#"  {"_id":"K1","b": [1, 2]}"#.to_vec());
    assert_eq!(empty, br#"{"_id":"K2" }"#.to_vec());
    assert_eq!(
        probe_embedded_key(&injected).expect("object"),
        EmbeddedKey::Present("K1".to_string())
    );
}

#[test]
fn key_cache_refills_whole_batches_only() {
    let refills = Cell::new(0);
    let mut cache = KeyCache::new(2);
    let refill = |n: usize| -> Result<Vec<Key>, KeyError> {
        refills.set(refills.get() + 1);
        Ok((0..n)
            .map(|i| Key::from_canonical(format!("K{}", refills.get() * 10 + i)))
            .collect())
    };

    let first = cache.next(refill).expect("refill");
    let second = cache.next(refill).expect("cached");
    let third = cache.next(refill).expect("refill");

    assert_eq!(first.as_str(), "K10");
    assert_eq!(second.as_str(), "K11");
    assert_eq!(third.as_str(), "K20");
    assert_eq!(refills.get(), 2);
    assert_eq!(cache.remaining(), 1);
}

#[test]
fn key_cache_rejects_partial_refill() {
    let mut cache = KeyCache::new(3);

    let err = cache
        .next(|_| Ok::<_, KeyError>(vec![Key::from_canonical("1".to_string())]))
        .expect_err("partial batch rejected");

    assert_eq!(
        err,
        KeyError::PartialBatch {
            requested: 3,
            received: 1
        }
    );
    assert_eq!(cache.remaining(), 0);
}
