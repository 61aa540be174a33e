//! Configuration management with serde serialization/deserialization
//!
//! This module provides all configuration structures and utilities for the render tool,
//! including browser settings, page setup (paper format, margins, scale), and the
//! request/result types that flow through the render pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;

/// Main configuration structure for the render tool
///
/// Controls all aspects of the render service including browser pool size,
/// concurrency limits, timeouts, default page setup, and the directory used
/// for persisted output files.
///
/// # Examples
///
/// ```rust
/// use pdf_render_tool::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     browser_pool_size: 2,
///     max_concurrent_renders: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Number of Chrome browser instances to maintain in the pool (default: 4)
    ///
    /// Higher values increase concurrency but consume more memory and system resources.
    pub browser_pool_size: usize,

    /// Maximum number of concurrent render operations (default: 8 per CPU core)
    ///
    /// This limit prevents system overload during high-volume processing.
    /// Should be higher than browser_pool_size for optimal utilization.
    pub max_concurrent_renders: usize,

    /// Timeout for individual render operations (default: 30 seconds)
    ///
    /// Pages that take longer than this will be marked as failed and retried
    /// according to the retry_attempts setting.
    pub render_timeout: Duration,

    /// Number of retry attempts for failed renders (default: 3)
    ///
    /// Transient failures like navigation timeouts will be retried up to this
    /// limit with exponential backoff delays.
    pub retry_attempts: usize,

    /// Default page setup applied to every render (default: A4 portrait)
    ///
    /// Individual requests can override these settings wholesale via
    /// [`RenderRequest::page`].
    pub page: PageSettings,

    /// Default output kind when a request doesn't specify one (default: PDF)
    pub output: OutputKind,

    /// Image format used for screenshot output (default: PNG)
    ///
    /// PDF output ignores this setting. JPEG and WebP are produced by
    /// converting the captured PNG.
    pub screenshot_format: ImageFormat,

    /// Browser viewport used when capturing screenshots
    pub viewport: Viewport,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for requests (default: Chrome default)
    pub user_agent: Option<String>,

    /// Extra command-line arguments passed through to the browser launcher
    pub extra_chrome_args: Vec<String>,

    /// Directory where persisted output files are written (default: `$TMPDIR/pdf-render-tool`)
    ///
    /// Only outputs explicitly persisted through the output store land here;
    /// per-render scratch space uses short-lived temporary directories instead.
    pub save_dir: PathBuf,

    /// Age in seconds after which persisted output files are deleted (default: 0, disabled)
    ///
    /// When greater than zero, a best-effort cleanup of `save_dir` runs after
    /// each persisted render.
    pub auto_clean_file_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_pool_size: 4,
            max_concurrent_renders: num_cpus::get().max(1) * 8,
            render_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            page: PageSettings::default(),
            output: OutputKind::Pdf,
            screenshot_format: ImageFormat::Png,
            viewport: Viewport::default(),
            chrome_path: None,
            user_agent: None,
            extra_chrome_args: Vec::new(),
            save_dir: std::env::temp_dir().join("pdf-render-tool"),
            auto_clean_file_age_secs: 0,
        }
    }
}

/// Page setup for PDF generation
///
/// Maps onto Chrome's `Page.printToPDF` parameters. All lengths are in inches.
/// Values outside the ranges Chrome accepts are clamped when the parameters
/// are built, so a merged configuration is always valid.
///
/// # Examples
///
/// ```rust
/// use pdf_render_tool::{Margins, Orientation, PageSettings, PaperFormat};
///
/// let settings = PageSettings {
///     format: PaperFormat::Letter,
///     orientation: Orientation::Landscape,
///     margins: Margins::uniform(0.5),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageSettings {
    /// Paper format (default: A4)
    pub format: PaperFormat,

    /// Page orientation (default: portrait)
    pub orientation: Orientation,

    /// Page margins in inches, uniform or per-side (default: 0.39in, ~1cm)
    pub margins: Margins,

    /// Scale factor for page content, clamped to Chrome's 0.1..=2.0 (default: 1.0)
    pub scale: f64,

    /// Render CSS backgrounds into the PDF (default: true)
    pub print_background: bool,

    /// Honor CSS `@page` size over the configured paper format (default: false)
    pub prefer_css_page_size: bool,

    /// Page-load completion condition to wait for before rendering (default: load event)
    pub wait_until: WaitUntil,

    /// Extra delay after the wait condition, for pages that paint late (default: none)
    pub render_delay: Option<Duration>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            format: PaperFormat::A4,
            orientation: Orientation::Portrait,
            margins: Margins::default(),
            scale: 1.0,
            print_background: true,
            prefer_css_page_size: false,
            wait_until: WaitUntil::Load,
            render_delay: None,
        }
    }
}

/// Chrome rejects scale factors outside this range.
pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 2.0;

impl PageSettings {
    /// Build the CDP print parameters for these settings.
    ///
    /// Scale and margins are clamped to values Chrome accepts, so the result
    /// is always a valid print configuration.
    pub fn to_print_params(&self) -> PrintToPdfParams {
        let (paper_width, paper_height) = self.format.dimensions();

        PrintToPdfParams {
            landscape: Some(matches!(self.orientation, Orientation::Landscape)),
            print_background: Some(self.print_background),
            scale: Some(self.scale.clamp(MIN_SCALE, MAX_SCALE)),
            paper_width: Some(paper_width),
            paper_height: Some(paper_height),
            margin_top: Some(self.margins.top.max(0.0)),
            margin_bottom: Some(self.margins.bottom.max(0.0)),
            margin_left: Some(self.margins.left.max(0.0)),
            margin_right: Some(self.margins.right.max(0.0)),
            prefer_css_page_size: Some(self.prefer_css_page_size),
            ..Default::default()
        }
    }
}

/// Standard paper formats, or a custom size in inches
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum PaperFormat {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom { width: f64, height: f64 },
}

impl PaperFormat {
    /// Portrait dimensions in inches (width, height).
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PaperFormat::A3 => (11.69, 16.54),
            PaperFormat::A4 => (8.27, 11.69),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Custom { width, height } => (*width, *height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Page margins in inches
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Margins {
    pub fn uniform(inches: f64) -> Self {
        Self {
            top: inches,
            bottom: inches,
            left: inches,
            right: inches,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        // ~1cm on every side
        Self::uniform(0.39)
    }
}

/// Page-load completion condition
///
/// `Load` resolves on the page load event. `NetworkIdle` additionally waits
/// for a short settle window so late XHR-driven content has a chance to paint.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum WaitUntil {
    Load,
    NetworkIdle,
}

/// Output kind produced by a render
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum OutputKind {
    /// PDF document via Chrome's print pipeline
    Pdf,
    /// Page screenshot
    Screenshot,
}

impl OutputKind {
    pub fn extension(&self, screenshot_format: ImageFormat) -> &'static str {
        match self {
            OutputKind::Pdf => "pdf",
            OutputKind::Screenshot => screenshot_format.extension(),
        }
    }
}

/// Supported screenshot image formats
///
/// Capture is always PNG at the protocol level; JPEG and WebP are produced
/// by converting afterward.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Browser viewport used for screenshot capture
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,

    /// Device pixel ratio for high-DPI displays (default: 1.0)
    pub device_scale_factor: f64,

    /// Whether to emulate a mobile device (default: false)
    pub mobile: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
            mobile: false,
        }
    }
}

/// Content source for a render
#[derive(Debug, Clone)]
pub enum RenderSource {
    /// Remote URL to navigate to
    Url(String),
    /// Raw HTML, served to the browser from a scratch file
    Html(String),
}

impl RenderSource {
    /// Short description for logs and results.
    pub fn describe(&self) -> String {
        match self {
            RenderSource::Url(url) => url.clone(),
            RenderSource::Html(html) => format!("inline html ({} bytes)", html.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub id: String,
    pub source: RenderSource,
    pub output: OutputKind,
    /// Per-request page setup; when `None` the service default applies.
    pub page: Option<PageSettings>,
    /// Capture the full scrollable page instead of the viewport (screenshots only).
    pub full_page: bool,
    pub retry_count: usize,
}

impl RenderRequest {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            source: RenderSource::Url(url.into()),
            ..Default::default()
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self {
            source: RenderSource::Html(html.into()),
            ..Default::default()
        }
    }
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: RenderSource::Url(String::new()),
            output: OutputKind::Pdf,
            page: None,
            full_page: true,
            retry_count: 0,
        }
    }
}

#[derive(Debug)]
pub struct RenderResult {
    pub request_id: String,
    pub source: String,
    pub data: Vec<u8>,
    pub output: OutputKind,
    pub rendered_at: chrono::DateTime<chrono::Utc>,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<crate::error::RenderError>,
    pub metadata: RenderMetadata,
}

#[derive(Debug, Clone)]
pub struct RenderMetadata {
    pub page_title: Option<String>,
    pub final_url: Option<String>,
    pub byte_size: usize,
    /// Page count of the produced document; `None` for screenshots.
    pub page_count: Option<usize>,
    pub browser_slot_id: usize,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    get_chrome_args_with_instance_id(config, None)
}

/// Generate Chrome arguments with unique instance ID for browser pool isolation
///
/// This variant creates unique profile directories and debugging ports for each
/// browser instance to prevent singleton conflicts in concurrent environments.
pub fn get_chrome_args_with_instance_id(
    config: &Config,
    instance_id: Option<usize>,
) -> Vec<String> {
    let unique_id = match instance_id {
        Some(id) => format!("{}-{}", std::process::id(), id),
        None => format!("{}-{}", std::process::id(), uuid::Uuid::new_v4()),
    };

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--allow-running-insecure-content".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--ignore-ssl-errors".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        // Unique user data directory to avoid singleton issues
        format!("--user-data-dir=/tmp/pdf-render-profile-{}", unique_id),
        // Unique remote debugging port for each instance
        format!(
            "--remote-debugging-port={}",
            9222 + instance_id.unwrap_or(0)
        ),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args.extend(config.extra_chrome_args.iter().cloned());

    args
}

pub fn create_browser_config(config: &Config) -> chromiumoxide::browser::BrowserConfig {
    create_browser_config_with_instance_id(config, None)
}

pub fn create_browser_config_with_instance_id(
    config: &Config,
    instance_id: Option<usize>,
) -> chromiumoxide::browser::BrowserConfig {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args_with_instance_id(config, instance_id));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder
        .build()
        .unwrap_or_else(|_| BrowserConfig::with_executable("/usr/sbin/chromium"))
}
