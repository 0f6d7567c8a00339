//! Starting a local Chromium and finding its DevTools endpoint.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};

const LAUNCH_WAIT: Duration = Duration::from_secs(20);
const STDERR_TAIL: usize = 8;

/// Flags for every launched browser. Destination tabs sit in the background
/// while the injector polls them, so renderer throttling stays off.
pub(crate) fn launch_flags(headless: bool) -> Vec<&'static str> {
    let mut flags = vec![
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
        "--disable-breakpad",
        "--disable-dev-shm-usage",
        "--disable-popup-blocking",
        "--no-first-run",
        "--no-default-browser-check",
        "--remote-allow-origins=*",
    ];
    if headless {
        flags.extend(["--headless=new", "--mute-audio"]);
    }
    flags
}

fn sandbox_disabled() -> bool {
    env::var("TABCAST_DISABLE_SANDBOX")
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Absolute profile directory, created if missing.
pub(crate) fn prepare_profile(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    let dir = if cfg.user_data_dir.is_absolute() {
        cfg.user_data_dir.clone()
    } else {
        env::current_dir()
            .map_err(|err| launch_error(format!("cannot resolve working directory: {err}")))?
            .join(&cfg.user_data_dir)
    };
    fs::create_dir_all(&dir).map_err(|err| {
        launch_error(format!("cannot create profile dir {}: {err}", dir.display()))
    })?;
    Ok(dir)
}

pub(crate) fn browser_config(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let explicit = !cfg.executable.as_os_str().is_empty();
    if explicit && !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!(
                "chrome executable not found at {}",
                cfg.executable.display()
            ))
            .with_data(json!({
                "expected": cfg.executable,
                "hint": "Set TABCAST_CHROME or pass --chrome-path."
            })));
    }

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(LAUNCH_WAIT)
        .user_data_dir(prepare_profile(cfg)?)
        .args(launch_flags(cfg.headless));
    if !cfg.headless {
        builder = builder.with_head();
    }
    if sandbox_disabled() {
        builder = builder.no_sandbox();
    }
    if explicit {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder
        .build()
        .map_err(|err| launch_error(format!("invalid browser config: {err}")))
}

/// Spawn the browser process and wait for the websocket it listens on.
pub(crate) async fn launch(cfg: &CdpConfig) -> Result<(Child, String), AdapterError> {
    let mut child = browser_config(cfg)?
        .launch()
        .map_err(|err| launch_error(format!("failed to launch chromium: {err}")))?;
    let url = devtools_url(&mut child).await?;
    debug!(target: "cdp-transport", %url, "chromium is listening");
    Ok((child, url))
}

async fn devtools_url(child: &mut Child) -> Result<String, AdapterError> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| launch_error("chromium was started without a stderr pipe"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);

    let scan = async {
        while let Some(line) = lines.next().await {
            let line =
                line.map_err(|err| launch_error(format!("reading chromium stderr: {err}")))?;
            if let Some(url) = devtools_url_in(&line) {
                return Ok(url.to_string());
            }
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        let tail: Vec<String> = tail.into_iter().collect();
        Err(launch_error(format!(
            "chromium exited before printing its devtools url: {}",
            tail.join(" | ")
        )))
    };

    tokio::time::timeout(LAUNCH_WAIT, scan)
        .await
        .map_err(|_| launch_error("timed out waiting for the devtools url"))?
}

fn devtools_url_in(line: &str) -> Option<&str> {
    let (_, rest) = line.rsplit_once("listening on ")?;
    let url = rest.trim();
    (url.starts_with("ws") && url.contains("/devtools/browser/")).then_some(url)
}

fn launch_error(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo).with_hint(hint)
}
