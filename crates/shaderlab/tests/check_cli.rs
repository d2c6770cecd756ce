use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn shaderlab(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shaderlab"))
        .env("SHADERLAB_CONFIG_DIR", root.join("config"))
        .env("SHADERLAB_DATA_DIR", root.join("data"))
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run shaderlab")
}

#[test]
fn new_then_check_succeeds() {
    let root = TempDir::new().unwrap();
    let project = root.path().join("projects/glow.json");
    let project_arg = project.to_str().unwrap();

    let created = shaderlab(root.path(), &["new", project_arg, "--name", "Glow"]);
    assert!(created.status.success(), "{:?}", created);

    let contents = fs::read_to_string(&project).unwrap();
    assert!(contents.contains("\"name\": \"Glow\""));
    assert!(contents.contains("\"fragmentShader\""));

    let checked = shaderlab(root.path(), &["check", project_arg]);
    assert!(checked.status.success(), "{:?}", checked);
    let stdout = String::from_utf8_lossy(&checked.stdout);
    assert!(stdout.contains("Glow: ok"), "{stdout}");
    assert!(stdout.contains("resolution"), "{stdout}");

    let again = shaderlab(root.path(), &["new", project_arg]);
    assert!(!again.status.success());
}

#[test]
fn check_reports_located_diagnostics() {
    let root = TempDir::new().unwrap();
    let fragment = root.path().join("broken.frag");
    fs::write(
        &fragment,
        "precision mediump float;\nvoid main() {\n  gl_FragColor = vec4(missing, 1.0);\n}\n",
    )
    .unwrap();

    let output = shaderlab(root.path(), &["check", "--fragment", fragment.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fragment:3:"), "{stderr}");
}

#[test]
fn check_rejects_missing_main() {
    let root = TempDir::new().unwrap();
    let fragment = root.path().join("empty.frag");
    fs::write(&fragment, "float unused;\n").unwrap();

    let output = shaderlab(root.path(), &["check", "--fragment", fragment.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must contain a main function"), "{stderr}");
}

#[test]
fn check_notes_unmatched_parameters() {
    let root = TempDir::new().unwrap();
    let fragment = root.path().join("glow.frag");
    fs::write(
        &fragment,
        "precision mediump float;\nuniform float glow;\nvoid main() {\n  gl_FragColor = vec4(glow);\n}\n",
    )
    .unwrap();
    let params = root.path().join("params.json");
    fs::write(
        &params,
        r#"[
            {"name": "glow", "type": "float", "value": 0.5},
            {"name": "time", "type": "float", "value": 3.0},
            {"name": "spare", "type": "float", "value": 1.0}
        ]"#,
    )
    .unwrap();

    let output = shaderlab(
        root.path(),
        &[
            "check",
            "--fragment",
            fragment.to_str().unwrap(),
            "--params",
            params.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("glow"));
    assert!(stdout.contains("'time' is reserved"), "{stdout}");
    assert!(stdout.contains("'spare' has no matching uniform"), "{stdout}");
}

#[test]
fn invalid_settings_file_fails_snapshot() {
    let root = TempDir::new().unwrap();
    let settings = root.path().join("settings.toml");
    fs::write(&settings, "size = \"nope\"\n").unwrap();
    let out = root.path().join("out.png");

    let output = shaderlab(
        root.path(),
        &[
            "snapshot",
            "--config",
            settings.to_str().unwrap(),
            "--fragment",
            "unused.frag",
            "--out",
            out.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(!out.exists());
}
