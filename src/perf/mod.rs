/// Instrumentation for the geometry pipeline
/// Provides stage counters behind the "profiling" feature
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for the binning stages
pub struct StageCounters {
    // Classification counters
    pub planes_classified: AtomicU64,
    pub planes_dropped: AtomicU64,
    pub objects_rejected: AtomicU64,
    pub rep_points_extrapolated: AtomicU64,

    // Mesh-face counters
    pub faces_culled: AtomicU64,
    pub faces_fast_path: AtomicU64,
    pub faces_z_clipped: AtomicU64,
    pub buckets_flushed: AtomicU64,

    // Emission counters
    pub records_emitted: AtomicU64,
}

impl StageCounters {
    pub const fn new() -> Self {
        Self {
            planes_classified: AtomicU64::new(0),
            planes_dropped: AtomicU64::new(0),
            objects_rejected: AtomicU64::new(0),
            rep_points_extrapolated: AtomicU64::new(0),
            faces_culled: AtomicU64::new(0),
            faces_fast_path: AtomicU64::new(0),
            faces_z_clipped: AtomicU64::new(0),
            buckets_flushed: AtomicU64::new(0),
            records_emitted: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.planes_classified.store(0, Ordering::Relaxed);
        self.planes_dropped.store(0, Ordering::Relaxed);
        self.objects_rejected.store(0, Ordering::Relaxed);
        self.rep_points_extrapolated.store(0, Ordering::Relaxed);
        self.faces_culled.store(0, Ordering::Relaxed);
        self.faces_fast_path.store(0, Ordering::Relaxed);
        self.faces_z_clipped.store(0, Ordering::Relaxed);
        self.buckets_flushed.store(0, Ordering::Relaxed);
        self.records_emitted.store(0, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            planes_classified: self.planes_classified.load(Ordering::Relaxed),
            planes_dropped: self.planes_dropped.load(Ordering::Relaxed),
            objects_rejected: self.objects_rejected.load(Ordering::Relaxed),
            rep_points_extrapolated: self.rep_points_extrapolated.load(Ordering::Relaxed),
            faces_culled: self.faces_culled.load(Ordering::Relaxed),
            faces_fast_path: self.faces_fast_path.load(Ordering::Relaxed),
            faces_z_clipped: self.faces_z_clipped.load(Ordering::Relaxed),
            buckets_flushed: self.buckets_flushed.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy)]
pub struct CounterSnapshot {
    pub planes_classified: u64,
    pub planes_dropped: u64,
    pub objects_rejected: u64,
    pub rep_points_extrapolated: u64,
    pub faces_culled: u64,
    pub faces_fast_path: u64,
    pub faces_z_clipped: u64,
    pub buckets_flushed: u64,
    pub records_emitted: u64,
}

impl CounterSnapshot {
    /// Print formatted report
    pub fn print_report(&self) {
        println!("\n=== Pipeline Stage Counters ===");
        println!("\nClassification:");
        println!("  planes classified:       {:12}", self.planes_classified);
        println!("  planes dropped:          {:12}", self.planes_dropped);
        println!("  whole objects rejected:  {:12}", self.objects_rejected);
        println!(
            "  rep points extrapolated: {:12}",
            self.rep_points_extrapolated
        );

        println!("\nMesh Faces:");
        println!("  faces culled:            {:12}", self.faces_culled);
        println!("  faces on fast path:      {:12}", self.faces_fast_path);
        println!("  faces z-clipped:         {:12}", self.faces_z_clipped);
        println!("  buckets flushed:         {:12}", self.buckets_flushed);
        let binned = self.faces_fast_path + self.faces_z_clipped;
        if binned > 0 {
            let fast_rate = (self.faces_fast_path as f64 / binned as f64) * 100.0;
            println!("  fast path rate:          {:11.2}%", fast_rate);
        }

        println!("\nEmission:");
        println!("  records emitted:         {:12}", self.records_emitted);

        println!();
    }
}

/// Global stage counters instance
pub static PIPELINE_COUNTERS: StageCounters = StageCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value, std::sync::atomic::Ordering::Relaxed);
        }
    };
}
