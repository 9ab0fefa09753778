// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: decoding, encoding, and working-resolution normalisation.

pub mod normalize;
pub mod processor;

pub use normalize::{WorkingImage, normalize};
pub use processor::ImageProcessor;
