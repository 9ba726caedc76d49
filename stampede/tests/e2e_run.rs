use std::path::PathBuf;
use std::process::Command;

use anyhow::Context as _;
use stampede_testserver::TestServer;

fn temp_path(name: &str) -> PathBuf {
    let id = std::process::id();
    std::env::temp_dir().join(format!("stampede-e2e-{name}-{id}"))
}

async fn run_stampede(args: Vec<String>) -> anyhow::Result<std::process::Output> {
    let exe = env!("CARGO_BIN_EXE_stampede");

    tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run stampede binary")
}

#[tokio::test]
async fn e2e_run_writes_a_report_and_exits_zero() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let config_path = temp_path("config.yaml");
    let report_path = temp_path("report.html");

    let config = format!(
        r#"version: v1
tests:
  - name: ping
    vars:
      base: {base}
    steps:
      - name: check
        http:
          url_expr: "base .. '/ok'"
          method: GET
          timeout: 5s
          assertions:
            - statuscode: 200
            - contenttype: text/plain
      - name: note
        log:
          msg: all good
"#,
        base = server.base_url()
    );
    std::fs::write(&config_path, config).context("write config")?;

    let output = run_stampede(vec![
        "-f".to_string(),
        config_path.display().to_string(),
        "-r".to_string(),
        report_path.display().to_string(),
    ])
    .await?;

    let requests_seen = server.hits().total();
    server.shutdown().await;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    anyhow::ensure!(
        output.status.success(),
        "stampede exited with {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
        output.status
    );
    anyhow::ensure!(requests_seen == 1, "expected 1 request, saw {requests_seen}");

    let combined = format!("{stdout}\n{stderr}");
    anyhow::ensure!(
        combined.contains("Run stats"),
        "expected the run summary in the output:\n{combined}"
    );
    anyhow::ensure!(
        combined.contains("all good"),
        "expected the log step message in the output:\n{combined}"
    );

    let report = std::fs::read_to_string(&report_path).context("read report")?;
    anyhow::ensure!(report.contains("check"), "report misses the step table");
    anyhow::ensure!(
        report.contains(r#""steps":[{"name":"check""#),
        "report misses the timeline json:\n{report}"
    );
    anyhow::ensure!(report.contains("200"), "report misses the code map");

    let _ = std::fs::remove_file(&config_path);
    let _ = std::fs::remove_file(&report_path);
    Ok(())
}

#[tokio::test]
async fn e2e_step_failures_still_exit_zero() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let config_path = temp_path("failing.yaml");
    let config = format!(
        r#"version: v1
tests:
  - name: ping
    steps:
      - name: check
        http:
          url: {base}/ok
          method: GET
          assertions:
            - statuscode: 201
"#,
        base = server.base_url()
    );
    std::fs::write(&config_path, config).context("write config")?;

    let output = run_stampede(vec!["-f".to_string(), config_path.display().to_string()]).await?;
    server.shutdown().await;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    // Failed steps are statistics, not fatal errors.
    anyhow::ensure!(
        output.status.success(),
        "stampede exited with {}\nstdout:\n{stdout}\nstderr:\n{stderr}",
        output.status
    );

    let combined = format!("{stdout}\n{stderr}");
    anyhow::ensure!(
        combined.contains("expected 201, got 200"),
        "expected the assertion failure in the output:\n{combined}"
    );
    anyhow::ensure!(
        combined.contains("Steps failed:  1"),
        "expected a failed step in the summary:\n{combined}"
    );

    let _ = std::fs::remove_file(&config_path);
    Ok(())
}

#[tokio::test]
async fn e2e_invalid_config_exits_one() -> anyhow::Result<()> {
    let config_path = temp_path("invalid.yaml");
    std::fs::write(
        &config_path,
        "version: v1\ntests:\n  - name: t\n    steps:\n      - loop: {count: 0, steps: []}\n",
    )
    .context("write config")?;

    let output = run_stampede(vec!["-f".to_string(), config_path.display().to_string()]).await?;

    anyhow::ensure!(
        output.status.code() == Some(1),
        "expected exit code 1, got {:?}",
        output.status.code()
    );

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    anyhow::ensure!(
        combined.contains("count must be greater than 0"),
        "expected the validation error in the output:\n{combined}"
    );

    let _ = std::fs::remove_file(&config_path);
    Ok(())
}

#[tokio::test]
async fn e2e_missing_config_file_exits_one() -> anyhow::Result<()> {
    let output = run_stampede(vec![
        "-f".to_string(),
        temp_path("does-not-exist.yaml").display().to_string(),
    ])
    .await?;

    anyhow::ensure!(
        output.status.code() == Some(1),
        "expected exit code 1, got {:?}",
        output.status.code()
    );
    Ok(())
}
