//! End-to-end runs against a real Docker daemon. Ignored by default because
//! they need the daemon and pull the language images:
//! `cargo test -p coderun-core --test docker_e2e -- --ignored`

use coderun_core::{DockerRuntime, ExecutionError, LanguageRegistry, Runner, RunnerConfig};
use std::sync::Arc;

fn docker_runner(config: RunnerConfig) -> Runner {
    let runtime = DockerRuntime::connect().expect("docker client");
    Runner::new(Arc::new(LanguageRegistry::builtin()), Arc::new(runtime), &config)
}

#[tokio::test]
#[ignore] // Requires a running Docker daemon
async fn test_python_prints_two() {
    let output = docker_runner(RunnerConfig::default())
        .execute("python", "print(1+1)")
        .await
        .unwrap();
    assert_eq!(output, "2");
}

#[tokio::test]
#[ignore] // Requires a running Docker daemon
async fn test_js_whitespace() {
    let output = docker_runner(RunnerConfig::default())
        .execute("js", "console.log('a  b')")
        .await
        .unwrap();
    assert_eq!(output, "a b");
}

#[tokio::test]
#[ignore] // Requires a running Docker daemon
async fn test_cpp_source_with_shell_metacharacters() {
    let code = r#"#include <cstdio>
int main() { std::puts("quote \" dollar $HOME backtick ` done"); }"#;
    let output = docker_runner(RunnerConfig::default())
        .execute("cpp", code)
        .await
        .unwrap();
    assert_eq!(output, "quote \" dollar $HOME backtick ` done");
}

#[tokio::test]
#[ignore] // Requires a running Docker daemon
async fn test_infinite_loop_times_out() {
    let config = RunnerConfig {
        timeout_secs: 2,
        ..Default::default()
    };
    let err = docker_runner(config)
        .execute("python", "while True: pass")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Timeout { .. }), "got {:?}", err);
}

#[tokio::test]
#[ignore] // Requires a running Docker daemon
async fn test_missing_image_is_a_provision_error() {
    let mut config = RunnerConfig::default();
    config.images.insert(
        "python".to_string(),
        "coderun-test/does-not-exist:never".to_string(),
    );
    let registry = LanguageRegistry::builtin().with_image_overrides(&config.images);
    let runtime = DockerRuntime::connect().unwrap();
    let runner = Runner::new(Arc::new(registry), Arc::new(runtime), &config);

    let err = runner.execute("python", "print(1)").await.unwrap_err();
    assert!(matches!(err, ExecutionError::Provision { .. }), "got {:?}", err);
}
