//! Configuration resolution
//!
//! Named options resolve with the precedence: environment variable
//! (key upper-cased, dots replaced with underscores) → properties file →
//! built-in default. The result is an immutable [`Config`] snapshot,
//! resolved once per process and passed down by reference; backing storage
//! is never re-read after resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};

/// Default properties file, relative to the working directory.
pub const DEFAULT_PROPERTIES_FILE: &str = "config.properties";

static GLOBAL: OnceCell<Config> = OnceCell::new();

/// Browser engine to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "firefox" => BrowserKind::Firefox,
            "webkit" => BrowserKind::Webkit,
            _ => BrowserKind::Chromium,
        }
    }
}

/// When to capture step screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenshotMode {
    #[default]
    Always,
    OnFailure,
    Never,
}

impl ScreenshotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenshotMode::Always => "always",
            ScreenshotMode::OnFailure => "onFailure",
            ScreenshotMode::Never => "never",
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "onfailure" => ScreenshotMode::OnFailure,
            "never" => ScreenshotMode::Never,
            "always" => ScreenshotMode::Always,
            other => {
                warn!("unknown screenshot.mode '{}', using 'always'", other);
                ScreenshotMode::Always
            }
        }
    }
}

/// Immutable, resolved run-time options for a scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target environment name (selects `baseUrl.<env>`)
    pub env: String,

    /// Browser engine
    pub browser: BrowserKind,

    /// Launch the browser without a visible window
    pub headless: bool,

    /// Default per-operation timeout applied to the page
    pub default_timeout: Duration,

    /// Artificial per-operation delay for debugging
    pub slow_mo: Duration,

    /// Step screenshot policy
    pub screenshot_mode: ScreenshotMode,

    /// Capture the whole page rather than the viewport
    pub screenshot_full_page: bool,

    /// Record a video per browser context
    pub video_enabled: bool,
    pub video_dir: PathBuf,

    /// Record a Playwright trace per browser context
    pub trace_enabled: bool,
    pub trace_dir: PathBuf,

    /// Report output directory
    pub report_dir: PathBuf,

    /// Maximum concurrently running scenarios
    pub parallel_threads: usize,

    /// Retries the runner applies to failed scenarios
    pub retry_failed_count: u32,

    /// Storefront under test
    pub base_url: String,

    /// Backend API of the storefront
    pub api_base_url: String,
}

impl Config {
    /// Resolve the process-wide snapshot once; later calls observe the
    /// cached result. The properties path comes from `STORECHECK_CONFIG`
    /// when set, else [`DEFAULT_PROPERTIES_FILE`].
    pub fn global() -> HarnessResult<&'static Config> {
        GLOBAL.get_or_try_init(|| {
            let path = std::env::var("STORECHECK_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROPERTIES_FILE));
            Config::resolve(&path)
        })
    }

    /// Resolve a snapshot from a properties file plus process environment
    /// overrides. A missing file is treated as an empty source.
    pub fn resolve(path: &Path) -> HarnessResult<Config> {
        let props = match std::fs::read_to_string(path) {
            Ok(text) => parse_properties(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("properties file {} not found, using defaults", path.display());
                HashMap::new()
            }
            Err(e) => {
                return Err(HarnessError::Config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Self::resolve_with(&props, &|key| std::env::var(key).ok()))
    }

    /// Resolution core with an injected environment lookup, so override
    /// precedence is testable without mutating process env.
    pub(crate) fn resolve_with(
        props: &HashMap<String, String>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Config {
        let get = |key: &str| -> Option<String> {
            let env_key = key.to_ascii_uppercase().replace('.', "_");
            if let Some(value) = env(&env_key).filter(|v| !v.trim().is_empty()) {
                return Some(value);
            }
            props.get(key).filter(|v| !v.trim().is_empty()).cloned()
        };
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let get_bool = |key: &str, default: bool| {
            get(key).map(|v| v.trim().eq_ignore_ascii_case("true")).unwrap_or(default)
        };
        let get_u64 = |key: &str, default: u64| {
            get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        let env_name = get_or("env", "staging");
        let base_url = get(&format!("baseUrl.{}", env_name))
            .or_else(|| get("baseUrl"))
            .unwrap_or_else(|| "https://practicesoftwaretesting.com".to_string());

        Config {
            env: env_name,
            browser: BrowserKind::parse(&get_or("browser", "chromium")),
            headless: get_bool("headless", false),
            default_timeout: Duration::from_millis(get_u64("defaultTimeout", 30_000)),
            slow_mo: Duration::from_millis(get_u64("slowMo", 0)),
            screenshot_mode: ScreenshotMode::parse(&get_or("screenshot.mode", "always")),
            screenshot_full_page: get_bool("screenshot.fullPage", true),
            video_enabled: get_bool("video.enabled", false),
            video_dir: PathBuf::from(get_or("video.dir", "reports/videos")),
            trace_enabled: get_bool("trace.enabled", false),
            trace_dir: PathBuf::from(get_or("trace.dir", "reports/traces")),
            report_dir: PathBuf::from(get_or("report.dir", "reports")),
            parallel_threads: get_u64("parallel.threads", 1).max(1) as usize,
            retry_failed_count: get_u64("retry.failed.count", 0) as u32,
            base_url,
            api_base_url: get_or("api.baseUrl", "https://api.practicesoftwaretesting.com"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::resolve_with(&HashMap::new(), &|_| None)
    }
}

/// Parse `key=value` properties. Blank lines and `#`/`!` comments are
/// skipped; whitespace around keys and values is trimmed.
fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            props.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::resolve_with(&HashMap::new(), &no_env);
        assert_eq!(config.env, "staging");
        assert_eq!(config.browser, BrowserKind::Chromium);
        assert!(!config.headless);
        assert_eq!(config.default_timeout, Duration::from_millis(30_000));
        assert_eq!(config.screenshot_mode, ScreenshotMode::Always);
        assert!(config.screenshot_full_page);
        assert_eq!(config.parallel_threads, 1);
        assert_eq!(config.base_url, "https://practicesoftwaretesting.com");
    }

    #[test]
    fn properties_override_defaults() {
        let mut props = HashMap::new();
        props.insert("browser".to_string(), "firefox".to_string());
        props.insert("screenshot.mode".to_string(), "onFailure".to_string());
        props.insert("defaultTimeout".to_string(), "5000".to_string());
        let config = Config::resolve_with(&props, &no_env);
        assert_eq!(config.browser, BrowserKind::Firefox);
        assert_eq!(config.screenshot_mode, ScreenshotMode::OnFailure);
        assert_eq!(config.default_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn env_var_beats_properties_value() {
        let mut props = HashMap::new();
        props.insert("browser".to_string(), "firefox".to_string());
        props.insert("screenshot.mode".to_string(), "never".to_string());
        let env = |key: &str| match key {
            "BROWSER" => Some("webkit".to_string()),
            "SCREENSHOT_MODE" => Some("onFailure".to_string()),
            _ => None,
        };
        let config = Config::resolve_with(&props, &env);
        assert_eq!(config.browser, BrowserKind::Webkit);
        assert_eq!(config.screenshot_mode, ScreenshotMode::OnFailure);
    }

    #[test]
    fn env_specific_base_url_wins() {
        let mut props = HashMap::new();
        props.insert("env".to_string(), "prod".to_string());
        props.insert("baseUrl".to_string(), "https://staging.example.test".to_string());
        props.insert("baseUrl.prod".to_string(), "https://example.test".to_string());
        let config = Config::resolve_with(&props, &no_env);
        assert_eq!(config.base_url, "https://example.test");

        props.remove("baseUrl.prod");
        let config = Config::resolve_with(&props, &no_env);
        assert_eq!(config.base_url, "https://staging.example.test");
    }

    #[test]
    fn blank_env_value_falls_through() {
        let mut props = HashMap::new();
        props.insert("browser".to_string(), "firefox".to_string());
        let env = |key: &str| (key == "BROWSER").then(|| "  ".to_string());
        let config = Config::resolve_with(&props, &env);
        assert_eq!(config.browser, BrowserKind::Firefox);
    }

    #[test]
    fn unknown_screenshot_mode_falls_back_to_always() {
        let mut props = HashMap::new();
        props.insert("screenshot.mode".to_string(), "sometimes".to_string());
        let config = Config::resolve_with(&props, &no_env);
        assert_eq!(config.screenshot_mode, ScreenshotMode::Always);
    }

    #[test]
    fn parses_properties_text() {
        let props = parse_properties(
            "# comment\n\nbrowser = chromium\nheadless=true\n! other comment\nbad line\n",
        );
        assert_eq!(props.get("browser").unwrap(), "chromium");
        assert_eq!(props.get("headless").unwrap(), "true");
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn resolve_tolerates_missing_file() {
        let config = Config::resolve(Path::new("does/not/exist.properties")).unwrap();
        assert_eq!(config.env, "staging");
    }

    #[test]
    fn resolve_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.properties");
        std::fs::write(&path, "headless=true\nparallel.threads=4\n").unwrap();
        let config = Config::resolve(&path).unwrap();
        assert!(config.headless);
        assert_eq!(config.parallel_threads, 4);
    }
}
