// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Conditional span support for profiling.
//!
//! With the `profiling` feature the matching and search entry points carry
//! `tracing` spans; without it they compile to nothing.
//!
//! Function-level spans use the `#[cfg_attr]` pattern:
//!
//! ```rust,ignore
//! #[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
//! pub fn run_match(...) -> Result<MatchSet, Error> {
//!     // ...
//! }
//! ```
//!
//! Spans inside loops use the macros re-exported here:
//!
//! ```rust,ignore
//! #[cfg(feature = "profiling")]
//! let _span = crate::instrument::trace_span!("tolerance_step", k).entered();
//! ```

pub use tracing::{Span, debug_span, info_span, trace_span};
