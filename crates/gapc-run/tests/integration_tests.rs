use std::{fs::File, io::Write, path::PathBuf};

use rstest::rstest;
use scopeguard::defer;

const NUSSINOV: &str = r#"
[axiom]
name = "struct"
tracks = 1

[[nonterminals]]
name = "struct"

[[nonterminals]]
name = "closed"
"#;

const ALIGNMENT: &str = r#"{
  "axiom": { "name": "alignment", "tracks": 2 },
  "nonterminals": [
    {
      "name": "alignment",
      "tracks": 2,
      "tables": [{ "left": true, "right": false }, { "left": true, "right": false }]
    }
  ]
}"#;

const OUTSIDE: &str = r#"
[axiom]
name = "struct"
tracks = 1

[[nonterminals]]
name = "struct"

[[nonterminals]]
name = "outside_struct"
outside = true
"#;

fn create_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    let mut file = File::create(&path).expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    path
}

fn remove_file(path: &PathBuf) {
    if path.exists() {
        std::fs::remove_file(path).expect("Failed to delete temp file");
    }
}

#[test]
fn test_emit_single_track() -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file("gapc_it_emit.toml", NUSSINOV);
    defer! { remove_file(&model); }

    let assert = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(["emit", "--parallel", "off"])
        .arg(&model)
        .assert();
    assert.success().code(0).stdout(
        "\
void cyk() {
  for (unsigned int t_0_j = 0; t_0_j < t_0_seq.size(); ++t_0_j) {
    for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; --t_0_i) {
      nt_tabulate_struct(t_0_i - 1, t_0_j);
      nt_tabulate_closed(t_0_i - 1, t_0_j);
    }
    unsigned int t_0_i = 1;
    nt_tabulate_struct(t_0_i - 1, t_0_j);
    nt_tabulate_closed(t_0_i - 1, t_0_j);
  }
  unsigned int t_0_j = t_0_seq.size();
  for (unsigned int t_0_i = t_0_j + 1; t_0_i > 1; --t_0_i) {
    nt_tabulate_struct(t_0_i - 1, t_0_j);
    nt_tabulate_closed(t_0_i - 1, t_0_j);
  }
  unsigned int t_0_i = 1;
  nt_tabulate_struct(t_0_i - 1, t_0_j);
  nt_tabulate_closed(t_0_i - 1, t_0_j);
}
",
    );

    Ok(())
}

#[rstest]
#[case::tiled(vec!["emit"], vec!["#ifndef _OPENMP", "#pragma omp parallel", "#else", "#endif"])]
#[case::checkpoint(
    vec!["emit", "--checkpoint", "--parallel", "off"],
    vec!["int t_0_i_loaded = !load_checkpoint || !t_0_i;", "std::lock_guard<fair_mutex> lock(mutex);"]
)]
#[case::tile_size(vec!["emit", "--tile-size", "16"], vec!["tile_size = 16;"])]
#[case::indent_width(
    vec!["emit", "--parallel", "off", "--indent-width", "4"],
    vec!["\n    for (unsigned int t_0_j = 0;"]
)]
fn test_emit_options(
    #[case] args: Vec<&str>,
    #[case] expected: Vec<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file(
        &format!("gapc_it_options_{}.toml", args.join("_").replace('-', "")),
        NUSSINOV,
    );
    defer! { remove_file(&model); }

    let output = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(&args)
        .arg(&model)
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    for line in expected {
        assert!(stdout.contains(line), "missing {line:?} in\n{stdout}");
    }

    Ok(())
}

#[test]
fn test_emit_multi_track_json() -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file("gapc_it_alignment.json", ALIGNMENT);
    defer! { remove_file(&model); }

    let output = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .arg("emit")
        .arg(&model)
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("nt_tabulate_alignment(t_0_i - 1, t_1_i - 1);"));
    assert!(!stdout.contains("#pragma omp"));

    Ok(())
}

#[test]
fn test_trace() -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file("gapc_it_trace.toml", NUSSINOV);
    defer! { remove_file(&model); }

    let assert = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(["trace", "--parallel", "off", "--length", "1"])
        .arg(&model)
        .assert();
    assert.success().code(0).stdout(
        "\
nt_tabulate_struct(0, 0)
nt_tabulate_closed(0, 0)
nt_tabulate_struct(1, 1)
nt_tabulate_closed(1, 1)
nt_tabulate_struct(0, 1)
nt_tabulate_closed(0, 1)
",
    );

    Ok(())
}

#[test]
fn test_trace_openmp() -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file("gapc_it_trace_openmp.toml", NUSSINOV);
    defer! { remove_file(&model); }

    let output = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(["trace", "--openmp", "--tile-size", "2", "-n", "3"])
        .arg(&model)
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 2 * 10);
    assert!(stdout.lines().any(|line| line.ends_with(", iteration 0]")));

    Ok(())
}

#[rstest]
#[case::multi_track_parallel("gapc_it_fail.json", ALIGNMENT, vec!["emit", "--parallel", "on"], "tiled parallel evaluation")]
#[case::unsupported_format("gapc_it_fail.yaml", NUSSINOV, vec!["emit"], "unsupported grammar model format")]
#[case::zero_tile_size("gapc_it_fail.toml", NUSSINOV, vec!["emit", "--tile-size", "0"], "tile size must be positive")]
#[case::outside_disabled("gapc_it_fail_outside.toml", OUTSIDE, vec!["emit"], "outside generation is disabled")]
#[case::length_mismatch("gapc_it_fail_trace.json", ALIGNMENT, vec!["trace", "-n", "3"], "2 tracks")]
fn test_failures(
    #[case] name: &str,
    #[case] content: &str,
    #[case] args: Vec<&str>,
    #[case] message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file(name, content);
    defer! { remove_file(&model); }

    let output = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(&args)
        .arg(&model)
        .output()?;
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(message), "missing {message:?} in\n{stderr}");

    Ok(())
}

#[test]
fn test_emit_outside_override() -> Result<(), Box<dyn std::error::Error>> {
    let model = create_file("gapc_it_outside.toml", OUTSIDE);
    defer! { remove_file(&model); }

    let output = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(["emit", "--outside"])
        .arg(&model)
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("nt_tabulate_struct(t_0_i - 1, t_0_j);"));
    assert!(stdout.contains("nt_tabulate_outside_struct(t_0_i + t_0_j - t_0_seq.size(), t_0_j);"));
    assert!(!stdout.contains("#pragma omp"));

    Ok(())
}

#[test]
fn test_unknown_parallel_mode() {
    assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .args(["emit", "--parallel", "sometimes", "grammar.toml"])
        .assert()
        .failure()
        .code(2);
}

#[rstest]
#[case::nussinov("nussinov.toml", "nt_tabulate_closed(t_0_i - 1, t_0_j);")]
#[case::alignment("alignment.json", "int t_1_i_loaded = !load_checkpoint || !t_1_i;")]
fn test_emit_demos(#[case] name: &str, #[case] expected: &str) -> Result<(), Box<dyn std::error::Error>> {
    let model = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name);

    let output = assert_cmd::cargo::cargo_bin_cmd!("gapc-cyk")
        .arg("emit")
        .arg(&model)
        .output()?;
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.contains(expected));

    Ok(())
}
