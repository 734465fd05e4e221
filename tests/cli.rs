//! CLI Integration Tests
//!
//! Drives the `mcplink` binary end-to-end with an isolated config.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCHEMA: &str = r#"{"identifier":"test-mcp","name":"Test MCP","author":"Test Author","description":"Test Description","version":"1.0.0","config":{"type":"stdio","command":"npx","args":["-y","test-mcp"]}}"#;

/// Binary with no config file and no channel overrides.
fn mcplink(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mcplink").unwrap();
    cmd.env("MCPLINK_CONFIG", dir.path().join("config.json"))
        .env_remove("MCPLINK_CHANNEL")
        .env_remove("UPDATE_CHANNEL")
        .env_remove("RUST_LOG");
    cmd
}

fn generated_link(dir: &TempDir, extra: &[&str]) -> String {
    let output = mcplink(dir)
        .args(["generate", "--id", "test-mcp", "--schema", SCHEMA])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MCP install links"));
}

#[test]
fn test_generate_help() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--market-id"));
}

// ============================================================================
// Generate & Parse
// ============================================================================

#[test]
fn test_generate_link() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &["--market-id", "lobehub", "--meta", "category=test"]);

    assert!(link.starts_with("lobehub://plugin/install?type=mcp&id=test-mcp&schema="));
    assert!(link.contains("marketId=lobehub"));
    assert!(link.contains("meta_category=test"));
}

#[test]
fn test_generate_then_parse_json() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &["--market-id", "lobehub", "--meta", "category=test"]);

    mcplink(&dir)
        .args(["parse", "--json", &link])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id": "test-mcp""#))
        .stdout(predicate::str::contains(r#""category": "test""#))
        .stdout(predicate::str::contains(r#""marketId": "lobehub""#));
}

#[test]
fn test_parse_human_output() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &[]);

    mcplink(&dir)
        .args(["parse", &link])
        .assert()
        .success()
        .stdout(predicate::str::contains("test-mcp"))
        .stdout(predicate::str::contains("third_party (confirmation required)"))
        .stdout(predicate::str::contains("stdio (npx -y test-mcp)"));
}

#[test]
fn test_generate_schema_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("schema.json");
    std::fs::write(&path, SCHEMA).unwrap();

    mcplink(&dir)
        .args(["generate", "--id", "test-mcp", "--schema"])
        .arg(format!("@{}", path.display()))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("lobehub://plugin/install?"));
}

#[test]
fn test_generate_channel_flag_and_env() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &["--channel", "nightly"]);
    assert!(link.starts_with("lobehub-nightly://"));

    mcplink(&dir)
        .env("UPDATE_CHANNEL", "beta")
        .args(["generate", "--id", "test-mcp", "--schema", SCHEMA])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("lobehub-beta://"));
}

#[test]
fn test_generate_rejects_mismatched_id() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["generate", "--id", "other", "--schema", SCHEMA])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must match the id parameter"));
}

#[test]
fn test_generate_rejects_invalid_schema() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["generate", "--id", "x", "--schema", r#"{"identifier":"x"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid schema"));
}

#[test]
fn test_generate_rejects_bad_meta() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["generate", "--id", "test-mcp", "--schema", SCHEMA, "--meta", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_parse_invalid_link() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["parse", "https://example.com/plugin/install?id=x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid install link"));
}

// ============================================================================
// Legacy
// ============================================================================

#[test]
fn test_legacy_query_link() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["legacy", "--identifier", "figma", "--auto-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "lobehub://mcp/install?identifier=figma&source=official&autoConfig=true",
        ));
}

#[test]
fn test_legacy_json_link_parses() {
    let dir = TempDir::new().unwrap();
    let output = mcplink(&dir)
        .args(["legacy", "--identifier", "figma", "--format", "json", "--source", "community"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let link = String::from_utf8(output.stdout).unwrap();
    assert!(link.starts_with("lobehub://mcp/install?%7B"));

    mcplink(&dir)
        .args(["parse", "--json", link.trim()])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""identifier": "figma""#))
        .stdout(predicate::str::contains(r#""source": "community""#));
}

#[test]
fn test_legacy_rejects_non_object_preset() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["legacy", "--identifier", "figma", "--preset-config", "[1]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

// ============================================================================
// Trust
// ============================================================================

#[test]
fn test_trust_classification() {
    let dir = TempDir::new().unwrap();
    for (tag, verdict) in [
        ("official", "trusted"),
        ("github_official", "trusted"),
        ("third_party", "untrusted"),
        ("bogus", "untrusted"),
    ] {
        mcplink(&dir)
            .args(["trust", tag])
            .assert()
            .success()
            .stdout(predicate::str::diff(format!("{verdict}\n")));
    }
}

// ============================================================================
// Open
// ============================================================================

#[test]
fn test_open_trusted_link_needs_no_prompt() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["open", "lobehub://mcp/install?identifier=figma"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""type": "install-request""#))
        .stdout(predicate::str::contains(r#""success": true"#));
}

#[test]
fn test_open_untrusted_link_with_yes() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &[]);

    mcplink(&dir)
        .args(["open", "--yes", &link])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""requiresConfirmation": true"#))
        .stdout(predicate::str::contains(r#""success": true"#));
}

#[test]
fn test_open_untrusted_link_declined() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &[]);

    mcplink(&dir)
        .args(["open", &link])
        .write_stdin("n\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not trusted"))
        .stdout(predicate::str::contains("dismissed by user"));
}

#[test]
fn test_open_untrusted_link_accepted_on_prompt() {
    let dir = TempDir::new().unwrap();
    let link = generated_link(&dir, &[]);

    mcplink(&dir)
        .args(["open", &link])
        .write_stdin("y\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""success": true"#));
}

#[test]
fn test_open_json_record_without_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["open", "--yes", r#"lobehub://mcp/install?{"identifier":"figma"}"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""success": false"#))
        .stderr(predicate::str::contains("invalid install link"));
}

#[test]
fn test_open_invalid_link() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .args(["open", "lobehub://plugin/install?type=mcp"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""success": false"#))
        .stderr(predicate::str::contains("invalid install link"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_defaults() {
    let dir = TempDir::new().unwrap();
    mcplink(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("stable"))
        .stdout(predicate::str::contains("Loaded:      false"));
}

#[test]
fn test_config_file_sets_channel() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.json"), r#"{ "channel": "beta" }"#).unwrap();

    mcplink(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("lobehub-beta:"));
}

#[test]
fn test_malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();

    mcplink(&dir)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}
