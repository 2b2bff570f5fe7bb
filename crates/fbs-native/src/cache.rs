//! Instruction stream cache.
//!
//! Helper methods are shared between tables (and some are decoded both as a create-method callee
//! and during slot resolution), so each entry address is decoded once and the result, including
//! its call sites, is reused for the lifetime of the image. The map sits behind a
//! `parking_lot::RwLock`: reads dominate once the first pass over a type has run.

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::callsite::{extract_call_sites, CallSite};
use crate::decoder::{decoder_for, InstructionDecoder};
use crate::image::NativeImage;
use crate::instruction::Instruction;

/// Default upper bound on the bytes decoded for a single function.
pub const DEFAULT_MAX_FUNCTION_BYTES: usize = 0x4000;

/// Anything that can produce the instruction stream of a function.
pub trait InstructionSource: Send + Sync {
    fn decode(&self, entry: u64) -> Result<Vec<Instruction>>;
}

/// [`InstructionSource`] over a loaded image with the matching decoder.
pub struct ImageCode {
    image: NativeImage,
    decoder: Box<dyn InstructionDecoder>,
    max_function_bytes: usize,
}

impl ImageCode {
    pub fn new(image: NativeImage, max_function_bytes: usize) -> Result<Self> {
        let decoder = decoder_for(image.arch(), image.convention())?;
        Ok(Self {
            image,
            decoder,
            max_function_bytes,
        })
    }

    pub fn image(&self) -> &NativeImage {
        &self.image
    }
}

impl InstructionSource for ImageCode {
    fn decode(&self, entry: u64) -> Result<Vec<Instruction>> {
        let code = self
            .image
            .code_at(entry, self.max_function_bytes)
            .ok_or_else(|| anyhow!("address {:#x} is not mapped by the image", entry))?;
        self.decoder.decode(entry, code)
    }
}

/// A decoded function: its instruction stream and the call sites derived from it.
#[derive(Debug)]
pub struct DecodedFunction {
    pub entry: u64,
    pub instructions: Vec<Instruction>,
    pub call_sites: Vec<CallSite>,
}

/// Decode cache counters (thread-safe).
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: Arc<AtomicU64>,
    pub misses: Arc<AtomicU64>,
    pub decode_failures: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cache metrics (for reporting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub decode_failures: u64,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Entry-address keyed, memoized decode cache.
pub struct InstructionCache<S> {
    source: S,
    functions: RwLock<HashMap<u64, Arc<DecodedFunction>>>,
    metrics: CacheMetrics,
}

impl<S: InstructionSource> InstructionCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            functions: RwLock::new(HashMap::new()),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Decode (or fetch) the function at `entry`. Failures are not cached.
    pub fn function(&self, entry: u64) -> Result<Arc<DecodedFunction>> {
        if let Some(found) = self.functions.read().get(&entry) {
            self.metrics.record_hit();
            return Ok(Arc::clone(found));
        }

        self.metrics.record_miss();
        let instructions = self.source.decode(entry).map_err(|e| {
            self.metrics.record_decode_failure();
            e
        })?;
        let call_sites = extract_call_sites(&instructions);
        trace!(
            entry = format_args!("{:#x}", entry),
            instructions = instructions.len(),
            calls = call_sites.len(),
            "decoded function"
        );
        let decoded = Arc::new(DecodedFunction {
            entry,
            instructions,
            call_sites,
        });

        // Another worker may have raced us; keep whichever landed first.
        let mut functions = self.functions.write();
        Ok(Arc::clone(functions.entry(entry).or_insert(decoded)))
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource {
        decodes: AtomicUsize,
    }

    impl InstructionSource for CountingSource {
        fn decode(&self, entry: u64) -> Result<Vec<Instruction>> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            if entry == 0xdead {
                return Err(anyhow!("unmapped"));
            }
            Ok(vec![
                Instruction::load_const(entry, 1, 2),
                Instruction::call(entry + 5, 0x9000),
                Instruction::ret(entry + 10),
            ])
        }
    }

    fn cache() -> InstructionCache<CountingSource> {
        InstructionCache::new(CountingSource {
            decodes: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_memoizes_by_entry() {
        let cache = cache();
        let a = cache.function(0x1000).unwrap();
        let b = cache.function(0x1000).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.call_sites.len(), 1);
        assert_eq!(cache.source().decodes.load(Ordering::SeqCst), 1);

        let m = cache.metrics();
        assert_eq!((m.hits, m.misses), (1, 1));
        assert!((m.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failures_not_cached() {
        let cache = cache();
        assert!(cache.function(0xdead).is_err());
        assert!(cache.function(0xdead).is_err());
        assert_eq!(cache.source().decodes.load(Ordering::SeqCst), 2);
        assert_eq!(cache.metrics().decode_failures, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for entry in 0..16u64 {
                        let f = cache.function(0x1000 + (entry + i) % 16 * 0x10).unwrap();
                        assert_eq!(f.instructions.len(), 3);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }

    #[test]
    fn test_image_code_unmapped_address() {
        let image = NativeImage::raw(vec![0xC3], 0x1000, crate::Arch::X86_64);
        let code = ImageCode::new(image, DEFAULT_MAX_FUNCTION_BYTES).unwrap();
        assert!(code.decode(0x5000).is_err());
        assert_eq!(code.decode(0x1000).unwrap(), vec![Instruction::ret(0x1000)]);
    }
}
