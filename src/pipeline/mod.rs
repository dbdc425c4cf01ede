//! Pipeline stages for capturing and optimising document screenshots.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap a backend (e.g. another office suite) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ views ──▶ export ──▶ render ──▶ normalize ──▶ encode
//! (path)   (sheet→   (soffice   (pdfium)   (flatten,     (WebP loop,
//!           page)     → PDF)                resize)       atomic write)
//! ```
//!
//! 1. [`input`]     — validate the document path and detect its format
//! 2. [`views`]     — map a sheet name / slide number onto an exported page,
//!    reading sheet names straight from the zip container
//! 3. [`export`]    — headless LibreOffice export with an isolated profile
//! 4. [`render`]    — rasterise one page; blocking, run via `spawn_blocking`
//! 5. [`normalize`] — composite alpha on white and cap the width (Lanczos3)
//! 6. [`encode`]    — size-constrained WebP, optional max-compression PNG

pub mod encode;
pub mod export;
pub mod input;
pub mod normalize;
pub mod render;
pub mod views;
