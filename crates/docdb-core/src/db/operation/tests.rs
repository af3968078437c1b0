use super::*;
use crate::{
    config::{CollectionConfig, KeyAssignment, KeySqlType, ObjectKind, VersionMethod},
    db::{
        Document,
        backend::{BindValue, ColumnValue, Execution, Row},
        compiled::{BindRole, CommandShape},
    },
    key::Key,
    test_support::{MockConnection, client_config, collection, collection_with, text_row},
};
use proptest::prelude::*;
use serde_json::json;

///
/// SelectorCall
///

#[derive(Clone, Debug)]
enum SelectorCall {
    Key(String),
    Keys(Vec<String>),
    Like(String),
    Start(String, bool),
}

impl SelectorCall {
    const fn kind(&self) -> SelectorKind {
        match self {
            Self::Key(_) => SelectorKind::Key,
            Self::Keys(_) => SelectorKind::Keys,
            Self::Like(_) => SelectorKind::Like,
            Self::Start(..) => SelectorKind::Range,
        }
    }
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}"
}

fn arb_selector_call() -> impl Strategy<Value = SelectorCall> {
    prop_oneof![
        arb_key().prop_map(SelectorCall::Key),
        prop::collection::vec(arb_key(), 1..5).prop_map(SelectorCall::Keys),
        arb_key().prop_map(|prefix| SelectorCall::Like(format!("{prefix}%"))),
        (arb_key(), any::<bool>()).prop_map(|(start, asc)| SelectorCall::Start(start, asc)),
    ]
}

fn apply<'c>(
    builder: OperationBuilder<'c, MockConnection>,
    call: &SelectorCall,
) -> OperationBuilder<'c, MockConnection> {
    match call {
        SelectorCall::Key(key) => builder.key(key),
        SelectorCall::Keys(keys) => builder.keys(keys),
        SelectorCall::Like(pattern) => builder.key_like(pattern, None),
        SelectorCall::Start(start, ascending) => builder.start_key(start, *ascending, true),
    }
    .expect("valid selector")
}

fn unversioned(assignment: KeyAssignment) -> CollectionConfig {
    CollectionConfig::builder("docs", "DOCS")
        .key_assignment(assignment)
        .without_version()
        .build()
        .expect("valid config")
}

proptest! {
    #[test]
    fn last_selector_wins(calls in prop::collection::vec(arb_selector_call(), 1..8)) {
        let docs = collection(client_config());
        let builder = calls.iter().fold(docs.find(), apply);

        let last = calls.last().map(SelectorCall::kind);
        prop_assert_eq!(builder.selector().map(Selector::kind), last);
        prop_assert!(!builder.state.suppress_filter_keys);
    }

    #[test]
    fn version_precondition_needs_a_version_column(
        assignment in prop_oneof![
            Just(KeyAssignment::Uuid),
            Just(KeyAssignment::Client),
            Just(KeyAssignment::Guid),
            Just(KeyAssignment::Embedded),
        ],
        token in "[A-F0-9]{1,16}",
    ) {
        let docs = collection(unversioned(assignment));

        let err = docs.find().version(&token).err().expect("no version column");
        prop_assert_eq!(err.class, ErrorClass::Unsupported);
        prop_assert!(err.command().is_none());
    }
}

#[test]
fn key_sets_are_canonical_and_deduplicated() {
    let docs = collection(client_config());

    let builder = docs.find().keys([" a", "b", "a "]).expect("valid keys");
    let empty = docs.find().keys(Vec::<String>::new()).err().expect("empty set");

    assert_eq!(
        builder.selector(),
        Some(&Selector::Keys(vec![
            Key::from_canonical("a".to_string()),
            Key::from_canonical("b".to_string()),
        ]))
    );
    assert_eq!(empty.class, ErrorClass::InvalidArgument);
}

#[test]
fn setting_a_selector_clears_key_ordering() {
    let docs = collection(client_config());

    let builder = docs.find().order_by_key_desc().key("a").expect("valid key");

    assert_eq!(builder.state.key_order, KeyOrder::Unrequested);
}

#[test]
fn key_patterns_need_text_keys() {
    let config = CollectionConfig::builder("docs", "DOCS")
        .key_column("ID", KeySqlType::Number, 38)
        .key_assignment(KeyAssignment::Client)
        .build()
        .expect("valid config");
    let docs = collection(config);

    let err = docs.find().key_like("1%", None).err().expect("number key");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn paging_and_locking_exclude_each_other() {
    let docs = collection(client_config());

    let after_lock = docs.find().lock().expect("lock").limit(5).err();
    let after_limit = docs.find().limit(5).expect("limit").lock().err();
    let after_skip = docs.find().skip(2).expect("skip").lock().err();
    let zero = docs.find().limit(0).err();

    for err in [after_lock, after_limit, after_skip, zero] {
        assert_eq!(err.expect("rejected").class, ErrorClass::InvalidArgument);
    }
}

#[test]
fn time_constraints_replace_each_other() {
    let docs = collection(client_config());

    let builder = docs
        .find()
        .time_range(Some("2024-01-01T00:00:00Z"), None, false)
        .expect("range")
        .last_modified("2024-02-01T10:00:00+02:00")
        .expect("precondition");
    let empty = docs.find().time_range(None, None, true).err().expect("no bounds");
    let garbled = docs.find().last_modified("yesterday").err().expect("bad timestamp");

    assert!(matches!(
        builder.state.time,
        Some(TimeConstraint::LastModified(_))
    ));
    assert_eq!(empty.class, ErrorClass::InvalidArgument);
    assert_eq!(garbled.class, ErrorClass::InvalidArgument);
}

#[test]
fn projection_and_header_only_replace_each_other() {
    let docs = collection(client_config());

    let header = docs
        .find()
        .project(&json!({"a": 1}))
        .expect("projection")
        .header_only();
    let projected = docs
        .find()
        .header_only()
        .project(&json!({"a.b": true, "c": true}))
        .expect("projection");
    let mixed = docs.find().project(&json!({"a": 1, "b": 0})).err().expect("mixed");

    assert!(header.state.is_header_only());
    assert_eq!(
        projected.state.projection,
        Some(Projection::Spec(ProjectionSpec {
            paths: vec!["$.a.b".to_string(), "$.c".to_string()],
            include: true,
        }))
    );
    assert_eq!(mixed.class, ErrorClass::InvalidArgument);
}

#[test]
fn projection_needs_a_json_only_collection() {
    let config = CollectionConfig::builder("files", "FILES")
        .media_type_column("CONTENT_TYPE")
        .build()
        .expect("valid config");
    let docs = collection(config);

    let err = docs.find().project(&json!({"a": 1})).err().expect("mixed media");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn hints_cannot_close_the_comment() {
    let docs = collection(client_config());

    assert!(docs.find().hint("INDEX(t IDX_A)").is_ok());
    let err = docs.find().hint("x */ DROP").err().expect("terminator");

    assert_eq!(err.class, ErrorClass::InvalidArgument);
}

#[test]
fn writes_reject_read_only_modifiers() {
    let docs = collection(client_config());

    let limited = docs.find().limit(3).expect("limit").compile(TerminalIntent::Remove);
    let snapshot = docs.find().as_of_scn(42).compile(TerminalIntent::Remove);
    let count_skip = docs.find().skip(3).expect("skip").compile(TerminalIntent::Count);

    for result in [limited, snapshot, count_skip] {
        let err = result.expect_err("rejected");
        assert_eq!(err.class, ErrorClass::InvalidArgument);
        assert!(err.command().is_none());
    }
}

#[test]
fn object_kind_gates_locks_and_snapshots() {
    let view = CollectionConfig::builder("docs", "DOCS_V")
        .object_kind(ObjectKind::View)
        .build()
        .expect("valid config");
    let duality = CollectionConfig::builder("docs", "DOCS_DV")
        .object_kind(ObjectKind::DualityView)
        .key_assignment(KeyAssignment::Embedded)
        .build()
        .expect("valid config");

    let view = collection(view);
    let duality = collection(duality);
    let lock = view
        .find()
        .lock()
        .expect("lock")
        .compile(TerminalIntent::GetCursor);
    let snapshot = duality
        .find()
        .as_of_scn(7)
        .compile(TerminalIntent::GetCursor);

    assert_eq!(lock.expect_err("view").class, ErrorClass::Unsupported);
    assert_eq!(snapshot.expect_err("duality").class, ErrorClass::Unsupported);
}

#[test]
fn read_only_collections_reject_writes() {
    let config = CollectionConfig::builder("docs", "DOCS")
        .read_only(true)
        .build()
        .expect("valid config");
    let docs = collection(config);

    let err = docs.find().remove().expect_err("read-only");
    let insert = docs.insert(&Document::new(b"{}".to_vec())).expect_err("read-only");

    assert_eq!(err.class, ErrorClass::Unsupported);
    assert_eq!(insert.class, ErrorClass::Unsupported);
    assert!(docs.connection().executed.is_empty());
}

#[test]
fn payload_intents_compile_through_their_own_calls() {
    let docs = collection(client_config());

    let err = docs
        .find()
        .key("a")
        .expect("key")
        .compile(TerminalIntent::Replace)
        .expect_err("needs a document");

    assert_eq!(err.class, ErrorClass::InvalidArgument);
}

#[test]
fn replace_needs_a_single_key() {
    let docs = collection(client_config());

    let err = docs
        .find()
        .keys(["a", "b"])
        .expect("keys")
        .replace(&Document::new(br#"{"v":1}"#.to_vec()))
        .expect_err("key set");

    assert_eq!(err.class, ErrorClass::InvalidArgument);
    assert!(docs.connection().executed.is_empty());
}

#[test]
fn get_one_rejects_multiple_matches() {
    let connection = MockConnection::new().with_handler(|_| {
        Ok(Execution::rows(vec![
            text_row(&["a", "{}", "t", "t", "v1"]),
            text_row(&["b", "{}", "t", "t", "v2"]),
        ]))
    });
    let docs = collection_with(client_config(), connection);

    let err = docs
        .find()
        .filter(json!({"status": "open"}))
        .expect("filter")
        .get_one()
        .expect_err("two rows");

    assert_eq!(err.class, ErrorClass::NotUnique);
}

#[test]
fn get_one_decodes_by_result_shape() {
    let connection = MockConnection::new().with_handler(|_| {
        Ok(Execution::rows(vec![text_row(&[
            "a",
            r#"{"v":1}"#,
            "2024-01-01T00:00:00Z",
            "2023-12-31T00:00:00Z",
            "ABC",
        ])]))
    });
    let docs = collection_with(client_config(), connection);

    let document = docs
        .find()
        .key("a")
        .expect("key")
        .get_one()
        .expect("executes")
        .expect("found");

    assert_eq!(document.key(), Some("a"));
    assert_eq!(document.content_str(), Some(r#"{"v":1}"#));
    assert_eq!(document.last_modified(), Some("2024-01-01T00:00:00Z"));
    assert_eq!(document.created_on(), Some("2023-12-31T00:00:00Z"));
    assert_eq!(document.version(), Some("ABC"));
}

#[test]
fn count_and_remove_report_numbers() {
    let connection = MockConnection::new().with_handler(|operation| {
        Ok(match operation.shape() {
            CommandShape::Count => Execution::rows(vec![Row(vec![ColumnValue::Int(3)])]),
            _ => Execution::affected(2),
        })
    });
    let docs = collection_with(client_config(), connection);

    let count = docs.find().count().expect("count");
    let removed = docs.find().keys(["a", "b"]).expect("keys").remove().expect("remove");

    assert_eq!((count, removed), (3, 2));
    assert_eq!(
        docs.connection().shapes(),
        vec![CommandShape::Count, CommandShape::Delete]
    );
}

#[test]
fn explain_returns_the_plan_text() {
    let connection = MockConnection::new().with_handler(|operation| {
        Ok(match operation.shape() {
            CommandShape::PlanDisplay => Execution::rows(vec![
                text_row(&["Plan hash value: 1"]),
                text_row(&["TABLE ACCESS FULL"]),
            ]),
            _ => Execution::default(),
        })
    });
    let docs = collection_with(client_config(), connection);

    let plan = docs.find().explain(ExplainLevel::Basic).expect("explain");

    assert_eq!(plan, "Plan hash value: 1\nTABLE ACCESS FULL");
    let connection = docs.connection();
    let explain = &connection.executed[0];
    let display = &connection.executed[1];
    assert!(explain.command().starts_with("EXPLAIN PLAN SET STATEMENT_ID = '"));
    assert_eq!(
        display.bind(BindRole::Filter),
        explain
            .command()
            .split('\'')
            .nth(1)
            .map(|id| BindValue::Text(id.to_string()))
            .as_ref()
    );
}

#[test]
fn replace_reports_zero_rows_as_false() {
    let connection = MockConnection::new().with_handler(|_| Ok(Execution::affected(0)));
    let docs = collection_with(client_config(), connection);

    let replaced = docs
        .find()
        .key("a")
        .expect("key")
        .version("STALE")
        .expect("version")
        .replace(&Document::new(br#"{"v":2}"#.to_vec()))
        .expect("executes");

    assert!(!replaced);
}

#[test]
fn merge_one_uses_a_single_statement_without_payload_versions() {
    let docs = collection(crate::test_support::versioned_config(VersionMethod::Sequential));

    let merged = docs
        .find()
        .key("a")
        .expect("key")
        .merge_one(br#"{"v":3}"#)
        .expect("merge");

    assert!(merged);
    let connection = docs.connection();
    assert_eq!(connection.shapes(), vec![CommandShape::Update]);
    let command = connection.executed[0].command();
    assert!(command.contains(r#"JSON_MERGEPATCH("JSON_DOCUMENT", ? RETURNING BLOB)"#));
    assert!(command.contains(r#""VERSION" = "VERSION" + 1"#));
}

#[test]
fn malformed_patch_specs_never_reach_the_backend() {
    let docs = collection(client_config());

    let err = docs
        .find()
        .key("a")
        .expect("key")
        .patch_one(br#"[{"op":"jump","path":"/a"}]"#)
        .expect_err("bad op");

    assert_eq!(err.class, ErrorClass::InvalidArgument);
    assert_eq!(docs.connection().probes, 0);
}
