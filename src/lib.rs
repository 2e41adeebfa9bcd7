//! # ssr-bridge
//!
//! Plugs a server-side rendering engine into an axum middleware stack.
//!
//! Each request goes to [`render::RenderEngine::visit`]. A successful render
//! becomes the response, buffered or streamed; a URL the engine does not
//! recognize goes on to the next handler; any other failure becomes a 500
//! carrying the engine's stack trace.
//!
//! ```rust,ignore
//! use axum::{Router, middleware::from_fn_with_state};
//! use ssr_bridge::middleware::{MiddlewareConfig, RenderMiddleware, render_pages};
//!
//! let pages = RenderMiddleware::new(
//!     MiddlewareConfig::default()
//!         .with_dist_path("./dist")
//!         .with_resilient(true),
//! )?;
//! let app = Router::new()
//!     .fallback(|| async { "not found" })
//!     .layer(from_fn_with_state(pages, render_pages));
//! ```

pub mod config;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod render;
