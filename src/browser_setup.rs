use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::config::CrawlConfig;
use crate::utils::constants::{CHROME_USER_AGENT, WINDOW_HEIGHT, WINDOW_WIDTH};

/// Find Chrome/Chromium executable on the system with platform-specific search paths.
pub async fn find_browser_executable() -> Result<PathBuf> {
    // Environment variable overrides the search
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(
                target: "pagegraph::launch",
                "Using browser from CHROMIUM_PATH: {}",
                path.display()
            );
            return Ok(path);
        }
        warn!(
            target: "pagegraph::launch",
            "CHROMIUM_PATH points to non-existent file: {}",
            path.display()
        );
    }

    let paths = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Brave Browser Nightly.app/Contents/MacOS/Brave Browser Nightly",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        // Linux
        vec![
            "/usr/bin/brave-browser-nightly",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
        ]
    };

    for path_str in paths {
        let path = match path_str.strip_prefix("~/") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            },
            None => PathBuf::from(path_str),
        };

        if path.exists() {
            info!(target: "pagegraph::launch", "Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    for cmd in &["brave-browser-nightly", "chromium", "chromium-browser", "google-chrome"] {
        let output = Command::new("which").arg(cmd).output();

        if let Ok(output) = output
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                let path = PathBuf::from(path_str);
                info!(target: "pagegraph::launch", "Found browser using 'which': {}", path.display());
                return Ok(path);
            }
        }
    }

    warn!(target: "pagegraph::launch", "No Chromium executable found");
    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Downloads a managed Chromium into the user cache directory.
///
/// The stock build has no page-graph support; crawls with it fail at graph
/// generation but still produce HAR and screenshots.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!(target: "pagegraph::launch", "Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir().join("pagegraph_chrome_cache");
            warn!(
                target: "pagegraph::launch",
                "Could not determine cache directory, using {}",
                fallback.display()
            );
            fallback
        })
        .join("pagegraph-crawl")
        .join("chromium");

    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );

    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;

    info!(
        target: "pagegraph::launch",
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Explicit executable, then discovery, then a managed download
pub async fn resolve_executable(config: &CrawlConfig) -> Result<PathBuf> {
    if let Some(path) = config.executable_path() {
        if path.exists() {
            return Ok(path.clone());
        }
        anyhow::bail!("Browser executable does not exist: {}", path.display());
    }
    match find_browser_executable().await {
        Ok(path) => Ok(path),
        Err(_) => download_managed_browser().await,
    }
}

/// Unpacked extension directories under `root`
///
/// `root` itself when it holds a manifest, otherwise each child directory
/// that does.
pub fn extension_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if root.join("manifest.json").is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("Failed to read extensions directory {}", root.display()))?
    {
        let path = entry?.path();
        if path.join("manifest.json").is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Browser arguments hiding common automation fingerprints
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--no-first-run",
    "--no-default-browser-check",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Translate a crawl configuration into a browser launch configuration
///
/// `display` is the X display of a virtual framebuffer; with one the
/// browser runs headed on it.
pub fn build_browser_config(
    config: &CrawlConfig,
    executable: &Path,
    profile_dir: &Path,
    display: Option<&str>,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
        .user_data_dir(profile_dir)
        .chrome_executable(executable)
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox");

    builder = match (config.interactive(), display) {
        (true, _) => builder.with_head(),
        (false, Some(display)) => builder.with_head().env("DISPLAY", display),
        (false, None) => builder.headless_mode(HeadlessMode::New),
    };

    if config.stealth() {
        builder = builder.args(STEALTH_ARGS.iter().copied());
        if config.user_agent().is_none() {
            builder = builder.arg(format!("--user-agent={CHROME_USER_AGENT}"));
        }
    }

    if let Some(root) = config.extensions_path() {
        let extensions = extension_dirs(root)?;
        if extensions.is_empty() {
            warn!(
                target: "pagegraph::launch",
                "No unpacked extensions found under {}",
                root.display()
            );
        } else {
            let joined = extensions
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(",");
            debug!(target: "pagegraph::launch", "Loading extensions: {joined}");
            builder = builder
                .arg(format!("--disable-extensions-except={joined}"))
                .arg(format!("--load-extension={joined}"));
        }
    }

    if let Some(proxy) = config.proxy_server() {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }

    builder = builder.args(config.extra_args().iter().map(String::as_str));

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))
}

/// Launch once and drive the protocol handler on its own task
///
/// The handler task ends when the browser connection closes.
pub async fn launch_once(browser_config: BrowserConfig) -> Result<(Browser, JoinHandle<()>)> {
    debug!(target: "pagegraph::launch", "Launching browser with config: {:?}", browser_config);
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();

                // Events chromiumoxide has no type for fail to deserialize;
                // the instrumented browser emits several of them.
                let is_benign_serialization_error = error_msg
                    .contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");

                if is_benign_serialization_error {
                    trace!(target: "pagegraph::launch", "Suppressed CDP serialization error: {error_msg}");
                } else {
                    error!(target: "pagegraph::launch", "Browser handler error: {e:?}");
                }
            }
        }
        debug!(target: "pagegraph::launch", "Browser handler task completed");
    });

    Ok((browser, handler_task))
}

/// Hide `navigator.webdriver` and friends in every document the page loads
pub async fn apply_stealth_measures(page: &chromiumoxide::Page) -> Result<()> {
    let script = r"
        Object.defineProperty(navigator, 'webdriver', { get: () => false });
        Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
        if (!window.chrome) { window.chrome = {}; }
        if (!window.chrome.runtime) {
            window.chrome.runtime = {
                connect: () => ({
                    onMessage: { addListener: () => {}, removeListener: () => {} },
                    postMessage: () => {}
                })
            };
        }
    ";
    page.evaluate_on_new_document(script)
        .await
        .context("Failed to install stealth script")?;
    debug!(target: "pagegraph::launch", "Stealth script installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dirs_single_and_nested() {
        let single = tempfile::tempdir().unwrap();
        std::fs::write(single.path().join("manifest.json"), "{}").unwrap();
        assert_eq!(extension_dirs(single.path()).unwrap(), vec![single.path().to_path_buf()]);

        let nested = tempfile::tempdir().unwrap();
        for name in ["ublock", "other"] {
            let dir = nested.path().join(name);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("manifest.json"), "{}").unwrap();
        }
        std::fs::create_dir(nested.path().join("not_an_extension")).unwrap();

        let found = extension_dirs(nested.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("other"));
        assert!(found[1].ends_with("ublock"));
    }
}
