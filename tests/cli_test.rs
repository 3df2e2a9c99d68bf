//! Driver round trips through the file system.

use std::process::Command;

const UNIT: &str = r#"{
    "functions": [{
        "name": "main",
        "is_extern": true,
        "body": [{ "type": "return", "argument":
            { "type": "literal", "value": { "string": "hello" } } }]
    }]
}"#;

fn wmlsc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_wmlsc"))
}

#[test]
fn test_compile_then_dump() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hello.json");
    std::fs::write(&input, UNIT).unwrap();

    let status = wmlsc()
        .current_dir(dir.path())
        .arg("compile")
        .arg(&input)
        .status()
        .unwrap();
    assert!(status.success());

    let module = dir.path().join("hello.wmlsc");
    let bytes = std::fs::read(&module).unwrap();
    assert_eq!(bytes[0], 0x01);

    let output = wmlsc().arg("dump").arg(&module).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"hello\""));
    assert!(stdout.contains("RETURN"));
}

#[test]
fn test_compile_errors_fail() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.json");
    std::fs::write(
        &input,
        r#"{ "functions": [{ "name": "f", "body": [{ "type": "continue", "line": 4 }] }] }"#,
    )
    .unwrap();

    let output = wmlsc()
        .current_dir(dir.path())
        .arg("compile")
        .arg(&input)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad.json:4:"));
    assert!(stderr.contains("continue statement not within a loop"));
    assert!(!dir.path().join("bad.wmlsc").exists());
}

#[test]
fn test_config_file_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hello.json");
    std::fs::write(&input, UNIT).unwrap();
    std::fs::write(
        dir.path().join("wmlsc.toml"),
        "output_extension = \"wmlc\"\n[compiler]\nuse_latin1_strings = true\n",
    )
    .unwrap();

    let status = wmlsc()
        .current_dir(dir.path())
        .arg("compile")
        .arg(&input)
        .status()
        .unwrap();
    assert!(status.success());

    let bytes = std::fs::read(dir.path().join("hello.wmlc")).unwrap();
    // One constant, character set 4 (ISO-8859-1).
    assert_eq!(&bytes[2..4], &[0x01, 0x04]);
}
