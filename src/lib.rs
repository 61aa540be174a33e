//! # PDF Render Tool
//!
//! Renders remote URLs or raw HTML into PDF documents and screenshots by
//! driving headless Chrome, with optional merging of many rendered documents
//! into a single PDF. A pool of persistent browser instances is shared
//! across renders, and every render works inside a scratch directory that is
//! removed when the call returns.
//!
//! ## Features
//!
//! - **URL and HTML sources**: render a live page or an HTML string
//! - **PDF page setup**: paper format, orientation, margins, scale, wait
//!   conditions, all mapped onto Chrome's print pipeline
//! - **Screenshots**: PNG capture with optional JPEG/WebP conversion
//! - **Merging**: concatenate rendered PDFs in input order
//! - **Browser Pool Management**: persistent Chrome instances with health
//!   checks and automatic restart
//! - **Retry Logic**: exponential backoff for transient failures, guarded by
//!   a circuit breaker
//! - **Scoped scratch space**: per-render temporary directories, deleted on
//!   success and failure alike
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_render_tool::{Config, RenderService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let service = RenderService::new(config).await?;
//!
//!     let pdf = service.render_html("<h1>Invoice</h1>", None).await?;
//!     println!("Rendered {} bytes", pdf.data.len());
//!
//!     let merged = service
//!         .render_urls_merged(
//!             vec![
//!                 "https://example.com/a".to_string(),
//!                 "https://example.com/b".to_string(),
//!             ],
//!             None,
//!         )
//!         .await?;
//!     println!("Merged PDF: {} bytes", merged.len());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ### Single render
//! ```bash
//! pdf-render-tool single --url https://example.com --output page.pdf
//! ```
//!
//! ### Screenshot
//! ```bash
//! pdf-render-tool single --url https://example.com --screenshot --output page.png
//! ```
//!
//! ### Render and merge
//! ```bash
//! pdf-render-tool merge --input urls.txt --output merged.pdf
//! ```

/// Configuration, page setup, and request/result types
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Browser pool management for concurrent Chrome instances
pub mod browser_pool;

/// Main render service orchestrating the pipeline
pub mod render_service;

/// PDF concatenation (in-process and external-tool paths)
pub mod merge;

/// Persisted output files and age-based cleanup
pub mod cleanup;

/// Worker processes for batch render execution
pub mod worker;

/// Command-line interface implementation
pub mod cli;

/// Performance metrics collection and monitoring
pub mod metrics;

/// Health checking system for browser instances and service
pub mod health;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod tests;

pub use browser_pool::*;
pub use cleanup::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use health::*;
pub use metrics::*;
pub use render_service::*;
pub use utils::*;
pub use worker::*;
