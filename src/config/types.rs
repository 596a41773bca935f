use serde::Deserialize;

/// Main configuration structure for Leilao-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// URL of the search form every sweep starts from
    #[serde(rename = "base-url")]
    pub base_url: String,
}

/// Timeouts and delays for navigation (all in milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Maximum wait for a selector or DOM condition
    #[serde(rename = "selector-timeout-ms")]
    pub selector_timeout_ms: u64,

    /// Maximum wait for a full page load
    #[serde(rename = "navigation-timeout-ms")]
    pub navigation_timeout_ms: u64,

    /// Pause after form interactions
    #[serde(rename = "action-delay-ms")]
    pub action_delay_ms: u64,

    /// Pause after switching listing pages
    #[serde(rename = "page-settle-ms")]
    pub page_settle_ms: u64,

    /// Wait budget for each detail-page marker tier
    #[serde(rename = "detail-marker-timeout-ms")]
    pub detail_marker_timeout_ms: u64,

    /// Pause when a detail page only showed its body
    #[serde(rename = "detail-fallback-settle-ms")]
    pub detail_fallback_settle_ms: u64,

    /// How often to click a confirmation button before giving up
    #[serde(rename = "next-step-attempts")]
    pub next_step_attempts: u32,

    /// Interval between condition checks while waiting
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            selector_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            action_delay_ms: 800,
            page_settle_ms: 2_000,
            detail_marker_timeout_ms: 5_000,
            detail_fallback_settle_ms: 1_000,
            next_step_attempts: 3,
            poll_interval_ms: 100,
        }
    }
}

/// Worker partitioning configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of partitions `divide` writes
    pub count: usize,

    /// Directory holding partition files
    #[serde(rename = "partition-dir")]
    pub partition_dir: String,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 6,
            partition_dir: "temp".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory worker reports are written to
    #[serde(rename = "report-dir", default = "default_report_dir")]
    pub report_dir: String,

    /// Maximum number of failures kept in a report's error log
    #[serde(rename = "error-log-limit", default = "default_error_log_limit")]
    pub error_log_limit: usize,
}

fn default_report_dir() -> String {
    "temp".to_string()
}

fn default_error_log_limit() -> usize {
    500
}

/// Browser launch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,

    /// Extra command-line arguments for the browser
    #[serde(rename = "chrome-args")]
    pub chrome_args: Vec<String>,

    /// Browser executable; discovered automatically when absent
    #[serde(rename = "chrome-path")]
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_args: Vec::new(),
            chrome_path: None,
        }
    }
}
