//! Main render service orchestrating the HTML-to-PDF pipeline
//!
//! This module provides the primary `RenderService` that coordinates
//! browser pools, page setup, and request processing for URL and raw-HTML
//! rendering, with an optional merge of many rendered documents into one.

use crate::{
    merge, utils, BrowserPool, CircuitBreaker, Config, ImageFormat, OutputKind, OutputStore,
    PageSettings, RenderError, RenderMetadata, RenderRequest, RenderResult, RenderSource,
    RetryConfig, WaitUntil,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// Settle window applied after the load event for `WaitUntil::NetworkIdle`.
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

/// Render service with browser pool management
///
/// The main entry point for turning URLs or raw HTML into PDF documents or
/// screenshots. Every render owns a scratch directory that is deleted when
/// the call returns, successful or not; callers only ever see in-memory
/// buffers.
///
/// # Examples
///
/// ```rust,no_run
/// use pdf_render_tool::{Config, RenderService};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = RenderService::new(config).await?;
///
///     let result = service.render_url("https://example.com", None).await?;
///     println!("Rendered {} bytes", result.data.len());
///
///     service.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct RenderService {
    pub browser_pool: Arc<BrowserPool>,
    config: Config,
    output_store: Arc<OutputStore>,
    circuit_breaker: Arc<CircuitBreaker>,
    concurrency_limiter: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    retry_config: RetryConfig,
}

impl RenderService {
    pub async fn new(config: Config) -> Result<Self, RenderError> {
        let browser_pool = Arc::new(BrowserPool::new(config.clone()).await?);
        let circuit_breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(30)));
        let concurrency_limiter = Arc::new(Semaphore::new(config.max_concurrent_renders));
        let output_store = Arc::new(OutputStore::new(config.save_dir.clone()));
        output_store.ensure_dir().await?;

        Ok(Self {
            browser_pool,
            config,
            output_store,
            circuit_breaker,
            concurrency_limiter,
            in_flight: Arc::new(AtomicUsize::new(0)),
            retry_config: RetryConfig::default(),
        })
    }

    pub fn output_store(&self) -> Arc<OutputStore> {
        self.output_store.clone()
    }

    /// Render a single URL using the service default output kind.
    pub async fn render_url(
        &self,
        url: impl Into<String>,
        page: Option<PageSettings>,
    ) -> Result<RenderResult, RenderError> {
        let request = RenderRequest {
            page,
            output: self.config.output,
            ..RenderRequest::url(url)
        };
        self.render_single(request).await
    }

    /// Render a raw HTML string to PDF.
    ///
    /// The HTML is written into the render's scratch directory and served to
    /// the browser as a `file://` URL.
    pub async fn render_html(
        &self,
        html: impl Into<String>,
        page: Option<PageSettings>,
    ) -> Result<RenderResult, RenderError> {
        let request = RenderRequest {
            page,
            output: self.config.output,
            ..RenderRequest::html(html)
        };
        self.render_single(request).await
    }

    /// Render every URL concurrently, returning results in input order.
    pub async fn render_urls(&self, urls: Vec<String>) -> Result<Vec<RenderResult>, RenderError> {
        let requests: Vec<RenderRequest> = urls
            .into_iter()
            .map(|url| RenderRequest {
                output: self.config.output,
                ..RenderRequest::url(url)
            })
            .collect();

        self.render_many(requests).await
    }

    /// Render every URL to PDF and merge the documents into one, in input order.
    ///
    /// Any failed render fails the whole operation; there is no partial merge.
    pub async fn render_urls_merged(
        &self,
        urls: Vec<String>,
        page: Option<PageSettings>,
    ) -> Result<Vec<u8>, RenderError> {
        let requests: Vec<RenderRequest> = urls
            .into_iter()
            .map(|url| RenderRequest {
                output: OutputKind::Pdf,
                page: page.clone(),
                ..RenderRequest::url(url)
            })
            .collect();

        let results = self.render_many(requests).await?;

        let mut documents = Vec::with_capacity(results.len());
        for result in results {
            if !result.success {
                return Err(result.error.unwrap_or_else(|| {
                    RenderError::PrintFailed(format!("render of {} failed", result.source))
                }));
            }
            documents.push(result.data);
        }

        info!("Merging {} rendered documents", documents.len());
        merge::merge_documents(&documents)
    }

    pub async fn render_single(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        let results = self.render_many(vec![request]).await?;
        results
            .into_iter()
            .next()
            .ok_or(RenderError::PrintFailed("No result returned".to_string()))
    }

    /// Fan requests out over the pool and join them back in input order.
    pub async fn render_many(
        &self,
        requests: Vec<RenderRequest>,
    ) -> Result<Vec<RenderResult>, RenderError> {
        let semaphore = self.concurrency_limiter.clone();
        let tasks: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let service = self.clone();
                let semaphore = semaphore.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await?;
                    service.render_with_retry(request).await
                })
            })
            .collect();

        // try_join_all keeps the spawn order, so results line up with inputs
        let results = try_join_all(tasks)
            .await
            .map_err(|e| RenderError::PageError(format!("render task failed: {e}")))?;

        results.into_iter().collect::<Result<Vec<_>, _>>()
    }

    async fn render_with_retry(
        &self,
        mut request: RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let result = self.render_with_retry_inner(&mut request).await;
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn render_with_retry_inner(
        &self,
        request: &mut RenderRequest,
    ) -> Result<RenderResult, RenderError> {
        let mut last_error = None;

        for attempt in 0..self.retry_config.max_attempts {
            if !self.circuit_breaker.can_execute() {
                return Err(RenderError::BrowserUnavailable);
            }

            request.retry_count = attempt;

            match self.render_once(request.clone()).await {
                Ok(mut result) => {
                    self.circuit_breaker.record_success();
                    result.success = true;
                    return Ok(result);
                }
                Err(e) => {
                    last_error = Some(e.clone());
                    self.circuit_breaker.record_failure();

                    if !e.is_retryable() || attempt == self.retry_config.max_attempts - 1 {
                        break;
                    }

                    let delay = self.calculate_retry_delay(attempt);
                    debug!(
                        "Retrying render of {} after {:?} (attempt {}/{})",
                        request.source.describe(),
                        delay,
                        attempt + 1,
                        self.retry_config.max_attempts
                    );
                    sleep(delay).await;
                }
            }
        }

        // Return failed result
        Ok(RenderResult {
            request_id: request.id.clone(),
            source: request.source.describe(),
            data: Vec::new(),
            output: request.output,
            rendered_at: chrono::Utc::now(),
            duration: Duration::from_secs(0),
            success: false,
            error: last_error,
            metadata: RenderMetadata {
                page_title: None,
                final_url: None,
                byte_size: 0,
                page_count: None,
                browser_slot_id: 0,
            },
        })
    }

    async fn render_once(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        let start_time = Instant::now();

        // Reject bad URLs before touching the pool
        if let RenderSource::Url(url) = &request.source {
            if utils::validate_url(url).is_err() {
                return Err(RenderError::InvalidUrl(url.clone()));
            }
        }

        let lease = self.browser_pool.acquire().await?;
        let browser_slot_id = lease.slot_id;

        // Scratch directory scoped to this render. Dropping the guard removes
        // it on every exit path, including timeouts and panicked awaits.
        let scratch = tempfile::Builder::new()
            .prefix("pdf-render-")
            .tempdir()
            .map_err(RenderError::from)?;

        let target_url = match &request.source {
            RenderSource::Url(url) => url.clone(),
            RenderSource::Html(html) => {
                let html_path = scratch.path().join("source.html");
                tokio::fs::write(&html_path, html).await?;
                url::Url::from_file_path(&html_path)
                    .map_err(|()| {
                        RenderError::PageError("failed to build file URL for scratch HTML".to_string())
                    })?
                    .to_string()
            }
        };

        let browser = lease.browser.lock().await;
        let page = browser
            .new_page(target_url.as_str())
            .await
            .map_err(|e| RenderError::NavigationFailed(e.to_string()))?;

        let result = self
            .render_page_with_timeout(&page, &request, scratch.path(), browser_slot_id, start_time)
            .await;

        let _ = page.close().await;

        result
    }

    async fn render_page_with_timeout(
        &self,
        page: &Page,
        request: &RenderRequest,
        scratch: &Path,
        browser_slot_id: usize,
        start_time: Instant,
    ) -> Result<RenderResult, RenderError> {
        let render_future = self.render_page(page, request, scratch, browser_slot_id, start_time);

        match timeout(self.config.render_timeout, render_future).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(self.config.render_timeout)),
        }
    }

    async fn render_page(
        &self,
        page: &Page,
        request: &RenderRequest,
        scratch: &Path,
        browser_slot_id: usize,
        start_time: Instant,
    ) -> Result<RenderResult, RenderError> {
        let settings = request
            .page
            .clone()
            .unwrap_or_else(|| self.config.page.clone());

        match settings.wait_until {
            WaitUntil::Load => {
                page.wait_for_navigation()
                    .await
                    .map_err(|e| RenderError::NavigationFailed(e.to_string()))?;
            }
            WaitUntil::NetworkIdle => {
                page.wait_for_navigation()
                    .await
                    .map_err(|e| RenderError::NavigationFailed(e.to_string()))?;
                sleep(NETWORK_IDLE_SETTLE).await;
            }
        }

        if let Some(delay) = settings.render_delay {
            sleep(delay).await;
        }

        let page_title = page.get_title().await.unwrap_or_default();
        let final_url = page
            .url()
            .await
            .unwrap_or_else(|_| Some(request.source.describe()));

        let data = match request.output {
            OutputKind::Pdf => self.print_pdf(page, &settings, scratch, &request.id).await?,
            OutputKind::Screenshot => self.capture_screenshot(page, request, scratch).await?,
        };

        let page_count = match request.output {
            OutputKind::Pdf => merge::page_count(&data).ok(),
            OutputKind::Screenshot => None,
        };

        let byte_size = data.len();
        let duration = start_time.elapsed();

        Ok(RenderResult {
            request_id: request.id.clone(),
            source: request.source.describe(),
            data,
            output: request.output,
            rendered_at: chrono::Utc::now(),
            duration,
            success: true,
            error: None,
            metadata: RenderMetadata {
                page_title,
                final_url,
                byte_size,
                page_count,
                browser_slot_id,
            },
        })
    }

    async fn print_pdf(
        &self,
        page: &Page,
        settings: &PageSettings,
        scratch: &Path,
        request_id: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let output_path = scratch.join(format!("{request_id}.pdf"));

        // Chrome writes into the scratch directory; the bytes come back with it
        page.save_pdf(settings.to_print_params(), &output_path)
            .await
            .map_err(|e| RenderError::PrintFailed(e.to_string()))
    }

    async fn capture_screenshot(
        &self,
        page: &Page,
        request: &RenderRequest,
        scratch: &Path,
    ) -> Result<Vec<u8>, RenderError> {
        let viewport = &self.config.viewport;

        let emulation_params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width)
            .height(viewport.height)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(viewport.mobile)
            .build()
            .map_err(|e| RenderError::PageError(e.to_string()))?;

        page.execute(emulation_params)
            .await
            .map_err(|e| RenderError::PageError(e.to_string()))?;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(request.full_page)
            .build();

        let output_path = scratch.join(format!("{}.png", request.id));
        let png_data = page
            .save_screenshot(params, &output_path)
            .await
            .map_err(|e| RenderError::CaptureFailed(e.to_string()))?;

        self.convert_image_format(png_data)
    }

    fn convert_image_format(&self, png_data: Vec<u8>) -> Result<Vec<u8>, RenderError> {
        match self.config.screenshot_format {
            ImageFormat::Png => Ok(png_data),
            ImageFormat::Jpeg => {
                let img = image::load_from_memory(&png_data)
                    .map_err(|e| RenderError::CaptureFailed(e.to_string()))?;

                let mut jpeg_data = Vec::new();
                img.write_to(&mut std::io::Cursor::new(&mut jpeg_data), image::ImageFormat::Jpeg)
                    .map_err(|e| RenderError::CaptureFailed(e.to_string()))?;

                Ok(jpeg_data)
            }
            ImageFormat::Webp => {
                let img = image::load_from_memory(&png_data)
                    .map_err(|e| RenderError::CaptureFailed(e.to_string()))?;

                let mut webp_data = Vec::new();
                img.write_to(&mut std::io::Cursor::new(&mut webp_data), image::ImageFormat::WebP)
                    .map_err(|e| RenderError::CaptureFailed(e.to_string()))?;

                Ok(webp_data)
            }
        }
    }

    /// Persist a result into the save directory, running the configured
    /// auto-clean afterwards.
    pub async fn persist_result(&self, result: &RenderResult) -> Result<PathBuf, RenderError> {
        let extension = result.output.extension(self.config.screenshot_format);
        let path = self.output_store.write_output(&result.data, extension).await?;

        self.output_store
            .auto_clean(self.config.auto_clean_file_age_secs)
            .await;

        Ok(path)
    }

    fn calculate_retry_delay(&self, attempt: usize) -> Duration {
        let delay = self.retry_config.initial_delay.as_millis() as f64
            * self.retry_config.multiplier.powi(attempt as i32);

        let delay = Duration::from_millis(delay as u64);

        if delay > self.retry_config.max_delay {
            self.retry_config.max_delay
        } else {
            delay
        }
    }

    /// Number of renders currently somewhere in the pipeline.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent_renders
    }

    pub async fn shutdown(&self) {
        info!("Shutting down render service...");
        self.browser_pool.shutdown().await;
        info!("Render service shutdown complete");
    }
}

impl Clone for RenderService {
    fn clone(&self) -> Self {
        Self {
            browser_pool: self.browser_pool.clone(),
            config: self.config.clone(),
            output_store: self.output_store.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            concurrency_limiter: self.concurrency_limiter.clone(),
            in_flight: self.in_flight.clone(),
            retry_config: self.retry_config.clone(),
        }
    }
}
