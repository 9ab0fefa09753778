// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline: edge-based document detection with a colour-contrast
// fallback, perspective correction, enhancement, and the orchestrator that
// sequences them.

pub mod cache;
pub mod contour;
pub mod detection;
pub mod edges;
pub mod enhance;
pub mod fallback;
pub mod perspective;
pub mod pipeline;
pub mod smoothing;
pub mod source;

pub use cache::{CacheStats, ScanCache};
pub use detection::{Detection, detect_document};
pub use enhance::ScanEnhancer;
pub use pipeline::{DocumentScanner, ScanResult};
pub use source::{FileFetcher, ImageFetcher};
