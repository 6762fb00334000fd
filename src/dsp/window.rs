use std::f64::consts::PI;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::quality::WindowType;

/// Precomputed window tables keyed by (size, type). Cleared on tier change.
#[derive(Default)]
pub struct WindowCache {
    tables: FxHashMap<(usize, WindowType), Arc<[f32]>>,
}

impl WindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, size: usize, window: WindowType) -> Arc<[f32]> {
        let size = size.max(2);
        self.tables
            .entry((size, window))
            .or_insert_with(|| build_window(size, window).into())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn invalidate(&mut self) {
        self.tables.clear();
    }
}

fn build_window(size: usize, window: WindowType) -> Vec<f32> {
    let denom = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let phase = i as f64 / denom;
            let value = match window {
                WindowType::Hann => 0.5 * (1.0 - (2.0 * PI * phase).cos()),
                // a0=0.42, a1=0.5, a2=0.08
                WindowType::Blackman => {
                    0.42 - 0.5 * (2.0 * PI * phase).cos() + 0.08 * (4.0 * PI * phase).cos()
                }
            };
            value.max(0.0) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_start_silent_and_peak_in_the_middle() {
        for window in [WindowType::Hann, WindowType::Blackman] {
            let table = build_window(513, window);
            assert!(table[0].abs() < 1e-6);
            assert!(table[512].abs() < 1e-6);
            assert!((table[256] - 1.0).abs() < 1e-6, "{:?}", window);
        }
    }

    #[test]
    fn cache_reuses_tables_until_invalidated() {
        let mut cache = WindowCache::new();
        let a = cache.get(1024, WindowType::Hann);
        let b = cache.get(1024, WindowType::Hann);
        assert!(Arc::ptr_eq(&a, &b));
        cache.get(1024, WindowType::Blackman);
        assert_eq!(cache.len(), 2);
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
