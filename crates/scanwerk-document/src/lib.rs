// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-document: Turns a photographed page into an upright, clean scan.
//
// Provides image decoding and working-resolution normalisation, document
// outline detection (Canny-style edges and connected components, with a
// colour-contrast fallback), perspective correction, enhancement filters, and
// the `DocumentScanner` orchestrator.

pub mod image;
pub mod scan;

// Re-export the primary types so callers can use `scanwerk_document::DocumentScanner` etc.
pub use crate::image::processor::ImageProcessor;
pub use scan::cache::ScanCache;
pub use scan::enhance::ScanEnhancer;
pub use scan::pipeline::{DocumentScanner, ScanResult};
pub use scan::source::{FileFetcher, ImageFetcher};
