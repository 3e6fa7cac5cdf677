use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures")
}

fn mdb(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mdb"))
        .args(args)
        .env_remove("MDB_CONFIG")
        .env("MDB_LOG", "warn")
        .output()
        .expect("run mdb")
}

fn fixture(name: &str) -> String {
    fixtures().join(name).display().to_string()
}

fn path_str(p: &Path) -> String {
    p.display().to_string()
}

#[test]
fn make_changelog_writes_liquibase_xml() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("changelog.xml");
    let result = mdb(&[
        "make-changelog",
        "--model_handle",
        "TEST",
        "--mdf_files",
        &fixture("test-model.yml"),
        &fixture("test-model-props.yml"),
        "--output_file_path",
        &path_str(&out),
        "--author",
        "ci",
        "--latest_version",
        "--add_rollback",
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let xml = fs::read_to_string(&out).unwrap();
    assert!(xml.contains("logicalFilePath=\"TEST_1.2.3_latest\""));
    assert!(xml.contains("author=\"ci\""));
    assert!(xml.contains("<neo4j:cypher>MERGE (n0:term"));
    assert!(xml.contains("<rollback>"));

    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("TEST_1.2.3_latest"));
}

#[test]
fn repeated_runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let run = |name: &str| {
        let out = dir.path().join(name);
        let result = mdb(&[
            "make-changelog",
            "--model_handle",
            "TEST",
            "--mdf_files",
            &fixture("test-model.yml"),
            &fixture("test-model-props.yml"),
            "--output_file_path",
            &path_str(&out),
            "--format",
            "cypher",
        ]);
        assert!(result.status.success());
        fs::read(&out).unwrap()
    };
    assert_eq!(run("a.cypher"), run("b.cypher"));
}

#[test]
fn schema_error_exits_with_code_two_and_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.yml");
    fs::write(&bad, "Handle: BAD\nVersion: 1.0.0\nNodes:\n  n:\n    Colour: blue\n").unwrap();
    let result = mdb(&[
        "--error-format",
        "json",
        "validate",
        "--mdf_files",
        &path_str(&bad),
    ]);
    assert_eq!(result.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&result.stderr);
    let line = stderr.lines().last().unwrap();
    let report: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(report["kind"], "schema");
}

#[test]
fn unresolved_reference_exits_with_code_four() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("dangling.yml");
    fs::write(
        &bad,
        "Handle: BAD\nVersion: 1.0.0\nNodes:\n  n:\n    Props: [missing]\n",
    )
    .unwrap();
    let result = mdb(&["validate", "--mdf_files", &path_str(&bad)]);
    assert_eq!(result.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&result.stderr).contains("error[unresolved]"));
}

#[test]
fn sync_terms_writes_one_changeset_per_unit() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = dir.path().join("snapshots");
    fs::create_dir_all(&snapshots).unwrap();
    fs::copy(fixtures().join("snapshot-TEST.json"), snapshots.join("TEST.json")).unwrap();
    let out = dir.path().join("out");

    let result = mdb(&[
        "sync-terms",
        "--current",
        &fixture("current-terms-TEST.json"),
        "--snapshot_dir",
        &path_str(&snapshots),
        "--output_dir",
        &path_str(&out),
        "--format",
        "json",
    ]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let text = fs::read_to_string(out.join("TEST_1.2.3_term-sync.json")).unwrap();
    let cs: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(cs["kind"], "term-sync");
    assert_eq!(cs["statements"].as_array().unwrap().len(), 2);
}

#[test]
fn bootstrap_then_renumber() {
    let dir = tempfile::tempdir().unwrap();
    let boot = dir.path().join("bootstrap.xml");
    let result = mdb(&["bootstrap", "--output_file_path", &path_str(&boot)]);
    assert!(result.status.success());

    let renumbered = dir.path().join("renumbered.xml");
    let result = mdb(&[
        "renumber",
        "--input",
        &path_str(&boot),
        "--start",
        "50",
        "--output",
        &path_str(&renumbered),
    ]);
    assert!(result.status.success());
    let xml = fs::read_to_string(&renumbered).unwrap();
    assert!(xml.contains("<changeSet id=\"50\""));
    assert!(xml.contains("IF NOT EXISTS"));
}
