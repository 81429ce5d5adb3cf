use std::fs;
use std::path::Path;

use plinth_api::routes::{self, RouteError};

#[test]
fn loads_yaml_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.yaml");
    fs::write(&path, "api:\n  user:\n    - url: \"get /u\"\n      action: get\n").unwrap();

    let table = routes::load(&path).unwrap();
    let validated = table.validate();
    assert_eq!(validated.binding_count(), 1);
    assert_eq!(validated.api[0].controller, "/controllers/user");
}

#[test]
fn loads_json_when_given_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    fs::write(&path, r#"{"api": {"user": [{"url": "get /u", "action": "get"}]}}"#).unwrap();

    let table = routes::load(&path).unwrap();
    assert_eq!(table.validate().binding_count(), 1);
}

#[test]
fn missing_file_is_a_distinct_error() {
    let err = routes::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
    assert!(matches!(err, RouteError::Missing(_)));
}

#[test]
fn env_override_wins_path_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.yaml");
    fs::write(&path, "api: {}\n").unwrap();

    std::env::set_var("PLINTH_ROUTES", &path);
    let resolved = routes::resolve_path();
    std::env::remove_var("PLINTH_ROUTES");

    assert_eq!(resolved, path);
}

#[test]
fn one_bad_entry_among_ten_costs_exactly_one_binding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.yaml");
    fs::write(
        &path,
        r#"
api:
  user:
    - url: "get /user/:id"
      action: get
    - url: "post /user"
      action: add
    - url: "put /user/:id"
      action: update
    - url: "delete /user/:id"
      action: remove
    - url: "get /user"
      action: getList
    - url: "teleport /user"
      action: warp
  order:
    - url: "get /order/:id"
      action: get
website:
  home:
    - url: "get /about"
      template: about
redirect:
  - url: "get /old"
    target: /
  - url: "get /gone"
    target: /
"#,
    )
    .unwrap();

    let validated = routes::load(&path).unwrap().validate();
    assert_eq!(validated.binding_count(), 9);
    assert_eq!(validated.skipped.len(), 1);
    assert!(validated.skipped[0].contains("teleport"));
}

#[test]
fn malformed_entries_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.yaml");
    fs::write(
        &path,
        r#"
api:
  user:
    - url: "get /good"
      action: get
    - url: "nonsense"
      action: get
    - action: orphan
website:
  pages:
    - url: "get /untemplated"
"#,
    )
    .unwrap();

    let validated = routes::load(&path).unwrap().validate();
    assert_eq!(validated.binding_count(), 1);
    assert_eq!(validated.skipped.len(), 3);
}
