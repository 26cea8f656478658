//! Virtual framebuffer for non-interactive crawls on Linux
//!
//! The instrumented browser runs headed, so headless crawls on Linux get an
//! Xvfb server. The server is killed when the handle drops.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::crawl_engine::wait_with_interval;
use crate::utils::constants::{WINDOW_HEIGHT, WINDOW_WIDTH, XVFB_EXTRA_ARGS};

const FIRST_DISPLAY: u32 = 99;
const LAST_DISPLAY: u32 = 599;
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// A running Xvfb server
#[derive(Debug)]
pub struct VirtualDisplay {
    number: u32,
    child: Child,
}

impl VirtualDisplay {
    /// Start a server on the first free display number
    pub async fn start() -> Result<Self> {
        let number = free_display_number()
            .context("No free X display number between :99 and :599")?;

        let child = Command::new("Xvfb")
            .arg(format!(":{number}"))
            .args(["-screen", "0"])
            .arg(format!("{WINDOW_WIDTH}x{WINDOW_HEIGHT}x24"))
            .arg("-nolisten")
            .arg("tcp")
            .args(XVFB_EXTRA_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn Xvfb; is it installed?")?;

        let socket = socket_path(number);
        let timed_out = wait_with_interval(STARTUP_TIMEOUT, STARTUP_POLL, || socket.exists()).await;
        if timed_out {
            anyhow::bail!("Xvfb did not come up on :{number} within {STARTUP_TIMEOUT:?}");
        }

        info!(target: "pagegraph::session", "Virtual display :{number} started");
        Ok(Self { number, child })
    }

    /// Value for the `DISPLAY` environment variable
    #[must_use]
    pub fn display(&self) -> String {
        format!(":{}", self.number)
    }

    /// Terminate the server and reap it
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(target: "pagegraph::cleanup", "Failed to stop Xvfb :{}: {}", self.number, e);
        } else {
            debug!(target: "pagegraph::cleanup", "Virtual display :{} stopped", self.number);
        }
    }
}

/// Whether a crawl with these settings needs a virtual display
#[must_use]
pub fn needs_virtual_display(interactive: bool) -> bool {
    cfg!(target_os = "linux") && !interactive
}

/// Start a display when `needed`; failure falls back to headless
pub async fn acquire(needed: bool) -> Option<VirtualDisplay> {
    if !needed {
        return None;
    }
    match VirtualDisplay::start().await {
        Ok(display) => Some(display),
        Err(e) => {
            warn!(target: "pagegraph::session", "Running without virtual display: {e:#}");
            None
        }
    }
}

fn lock_path(number: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/.X{number}-lock"))
}

fn socket_path(number: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/.X11-unix/X{number}"))
}

fn free_display_number() -> Option<u32> {
    (FIRST_DISPLAY..=LAST_DISPLAY).find(|n| !lock_path(*n).exists() && !socket_path(*n).exists())
}
