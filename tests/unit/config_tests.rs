use std::io::Write;
use std::time::Duration;

use catalyst_remote::config::GlobalConfig;
use catalyst_remote::AppError;

fn minimal_toml() -> &'static str {
    r#"
[ssh]
host = "build-host.example"
user = "deploy"
key_path = "/home/deploy/.ssh/id_ed25519"

[agent]
ideas_base_path = "/srv/ideas"
"#
}

fn full_toml() -> &'static str {
    r#"
[ssh]
host = "build-host.example"
port = 2222
user = "deploy"
key_path = "/home/deploy/.ssh/id_ed25519"
control_dir = "/run/catalyst"

[pool]
max_connections = 5
acquire_timeout_ms = 2500
poll_interval_ms = 50

[job]
idle_timeout_ms = 120000
watchdog_interval_ms = 5000
cancel_grace_ms = 1000

[agent]
binary = "claude-next"
chat_tools = "Read"
ideas_base_path = "/srv/ideas"
"#
}

#[test]
fn minimal_config_gets_defaults() {
    let config = GlobalConfig::from_toml_str(minimal_toml()).expect("config parses");

    assert_eq!(config.ssh.port, 22);
    assert_eq!(config.pool.max_connections, 3);
    assert_eq!(config.pool.acquire_timeout_ms, 10_000);
    assert_eq!(config.pool.poll_interval_ms, 100);
    assert_eq!(config.job.idle_timeout_ms, 600_000);
    assert_eq!(config.job.watchdog_interval_ms, 30_000);
    assert_eq!(config.job.cancel_grace_ms, 5_000);
    assert_eq!(config.agent.binary, "claude");
    assert_eq!(config.agent.chat_tools, "Read,Grep,Glob");
}

#[test]
fn explicit_values_override_defaults() {
    let config = GlobalConfig::from_toml_str(full_toml()).expect("config parses");

    assert_eq!(config.ssh.port, 2222);
    assert_eq!(config.pool.max_connections, 5);
    assert_eq!(config.job.cancel_grace_ms, 1000);
    assert_eq!(config.agent.binary, "claude-next");
}

#[test]
fn settings_conversions_use_milliseconds() {
    let config = GlobalConfig::from_toml_str(full_toml()).expect("config parses");

    let pool = config.pool_settings();
    assert_eq!(pool.max_connections, 5);
    assert_eq!(pool.acquire_timeout, Duration::from_millis(2500));
    assert_eq!(pool.poll_interval, Duration::from_millis(50));

    let job = config.job_settings();
    assert_eq!(job.idle_timeout, Duration::from_secs(120));
    assert_eq!(job.watchdog_interval, Duration::from_secs(5));
    assert_eq!(job.cancel_grace, Duration::from_secs(1));
}

#[test]
fn missing_ssh_section_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("[agent]\nideas_base_path = \"/srv\"\n")
        .expect_err("ssh section is required");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn empty_host_fails_validation() {
    let toml = minimal_toml().replace("build-host.example", "");
    let err = GlobalConfig::from_toml_str(&toml).expect_err("empty host rejected");
    assert!(err.to_string().contains("ssh.host"));
}

#[test]
fn zero_max_connections_fails_validation() {
    let toml = format!("{}\n[pool]\nmax_connections = 0\n", minimal_toml());
    let err = GlobalConfig::from_toml_str(&toml).expect_err("zero pool rejected");
    assert!(err.to_string().contains("max_connections"));
}

#[test]
fn zero_idle_timeout_fails_validation() {
    let toml = format!("{}\n[job]\nidle_timeout_ms = 0\n", minimal_toml());
    let err = GlobalConfig::from_toml_str(&toml).expect_err("zero timeout rejected");
    assert!(err.to_string().contains("job timeouts"));
}

#[test]
fn load_from_path_reads_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).expect("create config");
    file.write_all(minimal_toml().as_bytes()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.ssh.host, "build-host.example");
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/config.toml")
        .expect_err("missing file rejected");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}
