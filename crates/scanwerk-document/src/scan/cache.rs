// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result cache: bounded LRU of scan results keyed by a SHA-256 fingerprint
// of the source pixels and every setting that influences the output.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use image::DynamicImage;
use scanwerk_core::config::PipelineConfig;
use scanwerk_core::error::Result;
use scanwerk_core::types::ScanOptions;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::pipeline::ScanResult;

/// Fingerprint a scan request as a lowercase hex SHA-256 digest.
///
/// Covers dimensions, colour layout, raw pixel bytes, the serialised options,
/// and the serialised pipeline configuration, so any change that could alter
/// the output produces a different key.
pub fn cache_key(
    image: &DynamicImage,
    options: &ScanOptions,
    config: &PipelineConfig,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(format!("{:?}", image.color()).as_bytes());
    hasher.update(image.as_bytes());
    hasher.update(serde_json::to_vec(options)?);
    hasher.update(serde_json::to_vec(config)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, ScanResult>,
    /// Least recently used at the front.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

/// Bounded least-recently-used cache of scan results.
///
/// Owned by the caller and shared with a `DocumentScanner` through an `Arc`;
/// there is no global instance.
#[derive(Debug)]
pub struct ScanCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ScanCache {
    /// A capacity of zero disables storage; lookups always miss.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<ScanResult> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.entries.get(key).cloned() {
            Some(result) => {
                state.hits += 1;
                state.touch(key);
                debug!(key, "Scan cache hit");
                Some(result)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store `result`, evicting the least recently used entry when full.
    pub fn insert(&self, key: String, result: ScanResult) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.entries.insert(key.clone(), result).is_some() {
            state.touch(&key);
            return;
        }
        state.order.push_back(key);
        while state.entries.len() > self.capacity {
            let Some(evicted) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&evicted);
            debug!(key = %evicted, "Scan cache eviction");
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            len: state.entries.len(),
        }
    }
}
