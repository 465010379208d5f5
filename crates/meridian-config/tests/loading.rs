use std::io::Write;

use meridian_config::{load_parameters, merge_vars, parse_vars_flag, require};

#[test]
fn load_valid_parameter_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "project_name: demo\nuser_name: alice").unwrap();

    let vars = load_parameters(file.path()).expect("should load without error");
    assert_eq!(require(&vars, "project_name").unwrap(), "demo");
    assert_eq!(require(&vars, "user_name").unwrap(), "alice");
}

#[test]
fn missing_file_returns_error() {
    let path = std::path::Path::new("/nonexistent/path/does/not/exist.yml");
    assert!(load_parameters(path).is_err());
}

#[test]
fn cli_vars_win_over_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "disk_size: \"50\"").unwrap();
    let from_file = load_parameters(file.path()).unwrap();

    let overlay = parse_vars_flag("disk_size=100").unwrap();
    let merged = merge_vars(from_file, overlay);

    assert_eq!(require(&merged, "disk_size").unwrap(), "100");
}

#[test]
fn malformed_vars_assignment_errors() {
    assert!(parse_vars_flag("not-a-key-value-pair").is_err());
}
