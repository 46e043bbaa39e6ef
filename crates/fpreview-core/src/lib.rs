//! # fpreview-core - Core Domain Types
//!
//! Foundation crate for Flutter Preview. Provides the error taxonomy, dev
//! server and file-change events, serving URL detection, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`ServerEvent`] - stdout/stderr/exit events from the dev server process
//! - [`ChangeEvent`], [`ChangeKind`] - file-change notifications
//!
//! ### Serving URL (`server_url`)
//! - [`extract_server_url()`] - Find `http(s)://(localhost|127.0.0.1):<port>` in a line
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use fpreview_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;
pub mod server_url;

pub use error::{Error, Result, ResultExt};
pub use events::{ChangeEvent, ChangeKind, ServerEvent};
pub use server_url::{extract_server_url, looks_like_url_announcement, SERVED_AT_MARKER};
