use tlbsync_core::{Config, DataFormat, Field, ResolutionPolicy};
use tlbsync_sync::{Edit, EditSession, FailureKind, Outcome, Seed, Synchronizer};

fn session() -> EditSession {
    EditSession::new(Synchronizer::new(Seed::from(&Config::default())).expect("default synchronizer"))
}

#[test]
fn shell_echo_after_user_edit_is_suppressed() {
    let mut s = session();
    let outcome = s.apply(Edit::user(Field::Schema, "_ x:# = Foo;"));
    let state = match outcome {
        Outcome::Applied(state) => state,
        other => panic!("unexpected outcome: {other:?}"),
    };

    // The shell now writes the derived structured text back into its box.
    assert_eq!(s.apply(Edit::echo(Field::Structured, state.structured.clone())), Outcome::Ignored);
    assert_eq!(s.view().state, state);
    assert_eq!(s.generation(), 1);
}

#[test]
fn dependent_failure_after_schema_change_lands_on_structured() {
    let mut s = session();
    let edit = Edit::user(Field::Schema, "_ x:# = Foo;").with_policy(ResolutionPolicy::PreferStructured);
    match s.apply(edit) {
        Outcome::Rejected(failure) => assert_eq!(failure.kind, FailureKind::Encode),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let view = s.view();
    assert_eq!(view.state.schema, "_ x:# = Foo;");
    assert!(!view.errors.contains_key(&Field::Schema));
    assert!(view.errors[&Field::Structured].starts_with("Encode "));
}

#[test]
fn schema_success_clears_every_error() {
    let mut s = session();
    s.apply(Edit::user(Field::Binary, "###"));
    s.apply(Edit::user(Field::Schema, "#"));
    assert_eq!(s.errors().len(), 2);

    s.apply(Edit::user(Field::Binary, ""));
    s.apply(Edit::user(Field::Schema, "_ x:# = Foo;"));
    assert!(s.errors().is_empty(), "left: {:?}", s.errors());
}

#[test]
fn format_change_goes_through_session() {
    let mut s = session();
    assert!(s.set_format(DataFormat::Hex).is_applied());
    let view = s.view();
    assert_eq!(view.state.binary_format, DataFormat::Hex);
    assert!(view.state.binary.starts_with("b5ee9c72"));
}

#[test]
fn view_serializes_errors_by_field_name() {
    let mut s = session();
    s.apply(Edit::user(Field::Schema, "   "));
    let json = serde_json::to_value(s.view()).expect("serialize view");
    assert_eq!(json["errors"]["schema"], "Schema cannot be empty");
    assert_eq!(json["state"]["binary_format"], "base64");
    assert_eq!(json["generation"], 1);
}
