//! Driver smoke tests over the compiled binary.

use std::io::Write;
use std::process::Command;

fn run_uppc(source: &str, extra_args: &[&str]) -> std::process::Output {
    let mut file = tempfile::Builder::new()
        .suffix(".upp")
        .tempfile()
        .expect("temp source file");
    file.write_all(source.as_bytes()).expect("write source");
    let path = file.path().to_path_buf();
    Command::new(env!("CARGO_BIN_EXE_uppc"))
        .arg(&path)
        .args(extra_args)
        .output()
        .expect("run uppc")
}

#[test]
fn compiles_empty_main() {
    let output = run_uppc("main :: () -> () {}", &[]);
    assert!(output.status.success(), "stderr: {:?}", output.stderr);
}

#[test]
fn reports_errors_with_positions() {
    let output = run_uppc("main :: () -> () { y: int = x; }", &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unresolved symbol"), "stderr: {stderr}");
    assert!(stderr.contains(":1:"), "stderr: {stderr}");
}

#[test]
fn dump_program_lists_functions() {
    let output = run_uppc(
        "helper :: (x: int) -> int { return x; }\nmain :: () -> () {}",
        &["--dump-program"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("helper"), "stdout: {stdout}");
    assert!(stdout.contains("main: #"), "stdout: {stdout}");
}
