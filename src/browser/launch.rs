//! Browser discovery and launch
//!
//! Resolution order for the executable: the `COURSESCRAPE_BROWSER`
//! environment variable, then a scan of the `PATH` directories for known
//! browser binary names, then fixed per-platform install locations. When
//! nothing is installed, a managed Chromium is downloaded into the cache
//! directory. Launch always disables the sandbox and spawns the CDP
//! handler task that drives the connection.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

/// Binary names probed in each `PATH` directory.
#[cfg(target_os = "windows")]
const PATH_BINARIES: &[&str] = &["chrome.exe", "chromium.exe"];
#[cfg(not(target_os = "windows"))]
const PATH_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome-stable",
    "google-chrome",
];

/// Fixed install locations probed after the `PATH` scan.
#[cfg(target_os = "linux")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/snap/bin/chromium",
    "/opt/google/chrome/chrome",
];
#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/opt/homebrew/bin/chromium",
];
#[cfg(target_os = "windows")]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Chromium\Application\chrome.exe",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const INSTALL_LOCATIONS: &[&str] = &[];

/// Locate a Chrome/Chromium executable on this machine.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Some(path) = env_override() {
        return Ok(path);
    }

    if let Some(path) = scan_path() {
        info!("Using browser from PATH: {}", path.display());
        return Ok(path);
    }

    if let Some(path) = scan_install_locations() {
        info!("Using browser install at: {}", path.display());
        return Ok(path);
    }

    Err(anyhow::anyhow!("no Chrome or Chromium installation found"))
}

/// `COURSESCRAPE_BROWSER` wins over every probe when it names a real file.
fn env_override() -> Option<PathBuf> {
    let raw = std::env::var_os("COURSESCRAPE_BROWSER")?;
    let path = PathBuf::from(raw);
    if path.is_file() {
        info!("Using browser from COURSESCRAPE_BROWSER: {}", path.display());
        Some(path)
    } else {
        warn!(
            "Ignoring COURSESCRAPE_BROWSER, not a file: {}",
            path.display()
        );
        None
    }
}

/// Walk the `PATH` directories looking for a known browser binary.
fn scan_path() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in PATH_BINARIES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn scan_install_locations() -> Option<PathBuf> {
    INSTALL_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .chain(per_user_locations())
        .find(|path| path.is_file())
}

/// Per-user app bundles, which live under the home directory on macOS.
fn per_user_locations() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|home| {
                vec![
                    home.join("Applications/Chromium.app/Contents/MacOS/Chromium"),
                    home.join("Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
                ]
            })
            .unwrap_or_default()
    }
    #[cfg(not(target_os = "macos"))]
    {
        Vec::new()
    }
}

/// Download a managed Chromium when nothing is installed locally.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("No local browser found, downloading managed Chromium...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("coursescrape")
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
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Launch one browser process for a pool session.
///
/// The sandbox flags are disabled, required in the container environment
/// this runs in. Each session gets its own user-data directory; the caller
/// owns removing it after the browser closes.
pub async fn launch_browser(
    headless: bool,
    executable: Option<PathBuf>,
    user_agent: &str,
    user_data_dir: PathBuf,
) -> Result<(Browser, JoinHandle<()>)> {
    let chrome_path = match executable {
        Some(path) => path,
        None => match find_browser_executable() {
            Ok(path) => path,
            Err(_) => download_managed_browser().await?,
        },
    };

    std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .user_data_dir(user_data_dir)
        .chrome_executable(chrome_path);

    if headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={user_agent}"))
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-software-rasterizer")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--ignore-certificate-errors")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-ipc-flooding-protection")
        .arg("--disable-prompt-on-repost")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            let Err(e) = event else { continue };

            // Known upstream limitation: chromiumoxide cannot decode every
            // CDP event newer Chrome builds emit, and its handler reports
            // each undecodable message as an error even though the session
            // stays healthy. Decode complaints are noise; anything else is
            // a real fault.
            let text = e.to_string();
            if text.contains("deserialize") || text.contains("untagged enum") {
                trace!("Ignoring CDP decode noise: {text}");
            } else {
                error!("Browser handler error: {text}");
            }
        }
        trace!("Browser handler drained");
    });

    Ok((browser, handler_task))
}
