use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn stubweld_cmd() -> Command {
    Command::cargo_bin("stubweld").unwrap()
}

#[test]
fn help_describes_the_tool() {
    stubweld_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrites generated Python type stubs"))
        .stdout(predicate::str::contains("--scratch-dir"));
}

#[test]
fn version_flag_prints_the_binary_name() {
    stubweld_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stubweld"));
}

#[test]
fn missing_source_tree_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    stubweld_cmd()
        .current_dir(dir.path())
        .args(["--source-dir", "absent"])
        .assert()
        .failure();
}

#[test]
fn rewrites_a_seeded_scratch_tree() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("tests")).unwrap();
    fs::create_dir_all(dir.path().join("stubs/nexosapi/api/endpoints")).unwrap();
    fs::write(
        dir.path().join("stubs/nexosapi/api/endpoints/completions.pyi"),
        "import typing\n\
         class Ctl(NexosAIAPIEndpointController):\n\
         \x20   class Operations:\n\
         \x20       def with_model(request, model: str) -> None:\n\
         \x20           \"\"\"Set the model.\"\"\"\n",
    )
    .unwrap();

    stubweld_cmd()
        .current_dir(dir.path())
        .assert()
        .success();

    assert!(!dir.path().join("stubs").exists());
    let written = fs::read_to_string(
        dir.path().join("src/nexosapi/api/endpoints/completions.pyi"),
    )
    .unwrap();
    assert!(written.contains("class RequestManager(Ctl._RequestManager):"));
    assert!(written.contains("def with_model(model: str) -> Ctl.RequestManager:"));
    assert!(written.contains("request: Ctl.RequestManager"));
}

#[test]
fn profile_overrides_change_the_recognized_names() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("tests")).unwrap();
    fs::create_dir_all(dir.path().join("out/pkg/api")).unwrap();
    fs::write(
        dir.path().join("profile.json"),
        "{\"controller_class\": \"ApiController\", \"domain_stub_dir\": \"pkg/domain\"}",
    )
    .unwrap();
    fs::write(
        dir.path().join("out/pkg/api/thing.pyi"),
        "class ThingController(ApiController):\n\
         \x20   class Operations:\n\
         \x20       def tag(request) -> None:\n\
         \x20           \"\"\"Tag.\"\"\"\n",
    )
    .unwrap();

    stubweld_cmd()
        .current_dir(dir.path())
        .args(["--scratch-dir", "out", "--profile", "profile.json"])
        .assert()
        .success();

    let written = fs::read_to_string(dir.path().join("src/pkg/api/thing.pyi")).unwrap();
    assert!(written.contains("class RequestManager(ThingController._RequestManager):"));
}
