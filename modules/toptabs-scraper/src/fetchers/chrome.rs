use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use toptabs_catalog::Fetcher;

use super::USER_AGENT;

const ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(2);
const DUMP_TIMEOUT: Duration = Duration::from_secs(45);

/// Outcome of one `--dump-dom` run.
#[derive(Debug)]
enum Dump {
    Dom(String),
    /// Worth another try: the host was out of processes, or Chrome hung.
    Transient(String),
    Failed(String),
}

impl Dump {
    fn classify(output: std::io::Result<Output>) -> Self {
        match output {
            Ok(out) if out.status.success() => Dump::Dom(String::from_utf8_lossy(&out.stdout).into_owned()),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                if is_transient(&stderr) {
                    Dump::Transient(stderr)
                } else {
                    Dump::Failed(format!("Chrome exited with {}: {stderr}", out.status))
                }
            }
            Err(e) if is_transient(&e.to_string()) => Dump::Transient(e.to_string()),
            Err(e) => Dump::Failed(format!("Failed to launch Chrome: {e}")),
        }
    }
}

fn is_transient(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}

/// Last-resort fetch through a local headless Chromium. One browser at a time.
pub struct ChromeFetcher {
    chrome_bin: String,
    slot: Semaphore,
}

impl ChromeFetcher {
    pub fn new() -> Self {
        let chrome_bin = std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string());
        info!(chrome_bin = chrome_bin.as_str(), "ChromeFetcher initialized");
        Self {
            chrome_bin,
            slot: Semaphore::new(1),
        }
    }

    async fn dump_dom(&self, url: &str) -> Result<Dump> {
        // Fresh profile per run.
        let profile = tempfile::tempdir().context("Failed to create Chrome profile dir")?;

        let run = tokio::process::Command::new(&self.chrome_bin)
            .arg("--headless")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg("--dump-dom")
            .arg(url)
            .kill_on_drop(true)
            .output();

        Ok(match tokio::time::timeout(DUMP_TIMEOUT, run).await {
            Ok(output) => Dump::classify(output),
            Err(_) => Dump::Transient(format!("timed out after {}s", DUMP_TIMEOUT.as_secs())),
        })
    }
}

impl Default for ChromeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for ChromeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let scheme = url::Url::parse(url).context("Invalid URL")?.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            anyhow::bail!("Only http/https URLs allowed, got: {scheme}");
        }

        let _slot = self
            .slot
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Chrome slot closed"))?;

        let mut attempt = 1;
        loop {
            match self.dump_dom(url).await? {
                Dump::Dom(html) => {
                    info!(url, fetcher = "chrome", bytes = html.len(), "Fetched successfully");
                    return Ok(html);
                }
                Dump::Failed(reason) => anyhow::bail!("{reason} ({url})"),
                Dump::Transient(reason) if attempt < ATTEMPTS => {
                    let delay = RETRY_BASE * attempt
                        + Duration::from_millis(rand::rng().random_range(0..1000));
                    warn!(url, attempt, reason = %reason, delay_ms = delay.as_millis() as u64, "Chrome hiccup, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Dump::Transient(reason) => {
                    anyhow::bail!("Chrome gave up after {ATTEMPTS} attempts for {url}: {reason}")
                }
            }
        }
    }

    fn name(&self) -> &str {
        "chrome"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    use super::*;

    fn output(code: i32, stdout: &str, stderr: &str) -> std::io::Result<Output> {
        Ok(Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        })
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let fetcher = ChromeFetcher::new();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("Only http/https"));
    }

    #[test]
    fn successful_run_yields_dom() {
        assert!(matches!(Dump::classify(output(0, "<html></html>", "")), Dump::Dom(ref d) if d == "<html></html>"));
    }

    #[test]
    fn fork_failures_are_transient() {
        assert!(matches!(
            Dump::classify(output(1, "", "bash: fork: Cannot fork")),
            Dump::Transient(_)
        ));
        let launch = Err(std::io::Error::other("Resource temporarily unavailable"));
        assert!(matches!(Dump::classify(launch), Dump::Transient(_)));
    }

    #[test]
    fn other_failures_are_final() {
        assert!(matches!(
            Dump::classify(output(1, "", "Trace/breakpoint trap")),
            Dump::Failed(_)
        ));
        let missing = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"));
        assert!(matches!(Dump::classify(missing), Dump::Failed(ref m) if m.contains("launch")));
    }
}
