//! Catalog loading, override files and per-pipe flag tests.

use assert_fs::prelude::*;
use pipes_core::{Catalog, CatalogError, PipeId, ServiceId};
use predicates::prelude::predicate;
use predicates::Predicate;
use rstest::rstest;

fn basecamp() -> ServiceId {
    ServiceId::from("basecamp")
}

// ---------------------------------------------------------------------------
// 1. Built-in flags
// ---------------------------------------------------------------------------

#[rstest]
#[case(PipeId::Users, false, false)]
#[case(PipeId::Projects, true, false)]
#[case(PipeId::TodoLists, true, true)]
#[case(PipeId::Todos, true, true)]
fn builtin_flags(#[case] pipe: PipeId, #[case] automatic: bool, #[case] premium: bool) {
    let catalog = Catalog::builtin().expect("builtin");
    let entry = catalog.pipe(&basecamp(), pipe).expect("entry");
    assert_eq!(entry.automatic, automatic, "[{pipe}] automatic");
    assert_eq!(entry.premium, premium, "[{pipe}] premium");
    assert!(
        predicate::str::starts_with("Basecamp").eval(entry.description.as_str()),
        "[{pipe}] description: {}",
        entry.description
    );
}

#[test]
fn pipe_keys_follow_catalog_order() {
    let catalog = Catalog::builtin().expect("builtin");
    let keys: Vec<String> = catalog.pipe_keys().map(|k| k.to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "basecamp:users",
            "basecamp:projects",
            "basecamp:todolists",
            "basecamp:todos"
        ]
    );
}

// ---------------------------------------------------------------------------
// 2. Override files
// ---------------------------------------------------------------------------

#[test]
fn load_override_with_explicit_name() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("catalog.yaml");
    file.write_str(
        "services:\n  - id: asana\n    name: Asana Inc.\n    link: https://asana.com\n    image: /images/asana.png\n    auth_type: oauth\n    pipes:\n      - id: projects\n        description: Asana projects\n        automatic: true\n",
    )
    .expect("write");

    let catalog = Catalog::load_at(file.path()).expect("load");
    let asana = catalog.service(&ServiceId::from("asana")).expect("asana");
    assert_eq!(asana.display_name(), "Asana Inc.");
    let projects = catalog
        .pipe(&ServiceId::from("asana"), PipeId::Projects)
        .expect("projects");
    assert!(projects.automatic);
    assert!(!projects.premium, "premium defaults to false");
}

#[test]
fn load_missing_override_is_io_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = Catalog::load_at(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, CatalogError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("nope.yaml"));
}

#[test]
fn load_corrupt_override_is_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("catalog.yaml");
    file.write_str("services: [ {id: basecamp, pipes: [ {id: calendars} ] }")
        .expect("write");

    let err = Catalog::load_at(file.path()).unwrap_err();
    assert!(matches!(err, CatalogError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("catalog.yaml"));
}
