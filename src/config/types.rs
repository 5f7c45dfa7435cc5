use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Project URL advertised by the tool's own identity string
const PROJECT_UA_URL: &str = "https://github.com/scholar-ripple/scholar-ripple";

/// Browser identities rotated through by the transport
const BROWSER_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Main configuration structure for Scholar-Ripple
///
/// Every section has defaults, so an empty TOML document is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "block-detection")]
    pub block_detection: BlockDetectionConfig,
    #[serde(default, rename = "open-access")]
    pub open_access: OpenAccessConfig,
}

/// Request pacing, retry and identity configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TransportConfig {
    /// Minimum time between two outbound requests (milliseconds)
    pub request_delay_ms: u64,

    /// Upper bound of the random jitter added to the pacing sleep (milliseconds)
    pub jitter_ms: u64,

    /// Hard wall-clock timeout for one page request (seconds)
    pub timeout_secs: u64,

    /// Hard wall-clock timeout for one artifact download (seconds)
    pub download_timeout_secs: u64,

    /// Attempt ceiling for transient failures, including the first attempt
    pub max_attempts: u32,

    /// Backoff before the first retry (milliseconds)
    pub backoff_base_ms: u64,

    /// Backoff cap (milliseconds)
    pub backoff_max_ms: u64,

    /// Backoff growth factor per attempt
    pub backoff_multiplier: f64,

    /// Largest accepted response body (megabytes)
    pub max_body_mb: u64,

    /// Identity pool the User-Agent header is drawn from
    pub user_agents: Vec<String>,
}

impl TransportConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn max_body_bytes(&self) -> u64 {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let mut user_agents: Vec<String> =
            BROWSER_USER_AGENTS.iter().map(|ua| ua.to_string()).collect();
        user_agents.push(default_tool_user_agent());

        Self {
            request_delay_ms: 8_000,
            jitter_ms: 500,
            timeout_secs: 30,
            download_timeout_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 4_000,
            backoff_max_ms: 30_000,
            backoff_multiplier: 2.0,
            max_body_mb: 50,
            user_agents,
        }
    }
}

/// The tool's own identity, mixed into the rotation pool
pub fn default_tool_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("scholar-ripple/{version} (research-tool; +{PROJECT_UA_URL})")
}

/// Pagination behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Stop once this many distinct records have been collected
    pub max_records: usize,

    /// Maximum number of page requests per run
    pub max_pages: u32,

    /// Persist the snapshot every N fetched pages
    pub persist_every_pages: u32,

    /// Base URL used to resolve relative links and build search URLs
    pub base_url: String,

    /// Number of results the source serves per page
    pub page_size: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_records: 100,
            max_pages: 10,
            persist_every_pages: 2,
            base_url: "https://scholar.google.com".to_string(),
            page_size: 10,
        }
    }
}

/// Artifact acquisition configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DownloadConfig {
    /// Smallest payload accepted as a real PDF
    pub min_artifact_bytes: usize,

    /// Longest generated filename, extension included
    pub filename_max_length: usize,

    /// Persist the snapshot every N processed artifacts
    pub persist_every: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            min_artifact_bytes: 1024,
            filename_max_length: 100,
            persist_every: 10,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Resumable JSON snapshot
    pub state_file: PathBuf,

    /// Directory downloaded PDFs are written to
    pub papers_dir: PathBuf,

    /// SQLite download log
    pub download_log: PathBuf,

    /// JSON metadata export
    pub metadata_json: PathBuf,

    /// CSV metadata export
    pub metadata_csv: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("data/state.json"),
            papers_dir: PathBuf::from("data/papers"),
            download_log: PathBuf::from("data/papers/download_log.db"),
            metadata_json: PathBuf::from("data/metadata/metadata.json"),
            metadata_csv: PathBuf::from("data/metadata/metadata.csv"),
        }
    }
}

/// Markers that identify a challenge page instead of real content
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BlockDetectionConfig {
    /// Case-insensitive phrases searched for in textual bodies
    pub phrases: Vec<String>,

    /// Substrings of the final URL that indicate a challenge redirect
    pub redirect_markers: Vec<String>,
}

impl Default for BlockDetectionConfig {
    fn default() -> Self {
        Self {
            phrases: [
                "unusual traffic",
                "captcha",
                "not a robot",
                "verify you're not a robot",
                "automated queries",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            redirect_markers: ["/sorry/", "accounts.google.com/ServiceLogin"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Open-access lookup for records that have a DOI but no PDF link
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OpenAccessConfig {
    /// Look up an open-access PDF when a record has no artifact URL
    pub enabled: bool,

    /// Contact address sent to Unpaywall; the Unpaywall lookup is skipped without one
    pub contact_email: Option<String>,

    /// Unpaywall API root (`{root}/{doi}?email=...`)
    pub unpaywall_url: String,

    /// CrossRef works API root (`{root}/{doi}`)
    pub crossref_url: String,
}

impl Default for OpenAccessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            contact_email: None,
            unpaywall_url: "https://api.unpaywall.org/v2".to_string(),
            crossref_url: "https://api.crossref.org/works".to_string(),
        }
    }
}
