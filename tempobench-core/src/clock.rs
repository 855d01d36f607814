//! Clock sources and the cached fast clock.
//!
//! Two monotonic readings back every measurement: wall time and process
//! CPU time (self + children). Both are reported as seconds since an
//! arbitrary process-local origin; only differences are meaningful.
//!
//! The `FastClock` wraps either source behind a cached microsecond value
//! refreshed by a background ticker every ~1 ms, so the measurement
//! loop's "are we done?" check is a single relaxed load.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Ticker refresh period. Bounds the staleness of `FastClock::has_reached`.
const TICK_MICROS: u64 = 1000;

static CLOCK_ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Wall-clock seconds since the process-local origin.
#[inline]
pub fn walltime() -> f64 {
    CLOCK_ORIGIN.elapsed().as_secs_f64()
}

/// CPU seconds (user + system) consumed by this process and its reaped
/// children.
#[cfg(unix)]
pub fn cpu_usage() -> f64 {
    fn rusage_seconds(who: libc::c_int) -> f64 {
        // SAFETY: getrusage only writes into the struct we hand it.
        unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            if libc::getrusage(who, &mut usage) != 0 {
                return 0.0;
            }
            let tv = |t: libc::timeval| t.tv_sec as f64 + t.tv_usec as f64 * 1e-6;
            tv(usage.ru_utime) + tv(usage.ru_stime)
        }
    }
    rusage_seconds(libc::RUSAGE_SELF) + rusage_seconds(libc::RUSAGE_CHILDREN)
}

/// Fallback for platforms without `getrusage`: wall time stands in for
/// CPU time, which keeps single-threaded measurements meaningful.
#[cfg(not(unix))]
pub fn cpu_usage() -> f64 {
    walltime()
}

/// Which source a [`FastClock`] samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    /// Wall time.
    RealTime,
    /// Process CPU time, self + children.
    CpuTime,
}

impl ClockKind {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ClockKind::RealTime,
            _ => ClockKind::CpuTime,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ClockKind::RealTime => 0,
            ClockKind::CpuTime => 1,
        }
    }

    fn now_micros(self) -> i64 {
        let t = match self {
            ClockKind::RealTime => walltime(),
            ClockKind::CpuTime => cpu_usage(),
        };
        (t * 1e6) as i64
    }
}

struct ClockShared {
    kind: AtomicU8,
    approx_micros: AtomicI64,
    shutdown: AtomicBool,
}

/// A clock that provides a fast mechanism to check whether a deadline
/// has passed.
///
/// Construction spawns a ticker thread that refreshes the cached reading
/// every millisecond; the ticker is stopped and joined on drop. The
/// tolerated skew of [`has_reached`](FastClock::has_reached) is bounded
/// by the tick period. Interval boundaries must use the exact
/// [`now_micros`](FastClock::now_micros) instead.
pub struct FastClock {
    shared: Arc<ClockShared>,
    ticker: Option<JoinHandle<()>>,
}

impl FastClock {
    /// Create a clock over `kind` and start its background ticker.
    pub fn new(kind: ClockKind) -> Self {
        let shared = Arc::new(ClockShared {
            kind: AtomicU8::new(kind.as_u8()),
            approx_micros: AtomicI64::new(kind.now_micros()),
            shutdown: AtomicBool::new(false),
        });

        let ticker_shared = Arc::clone(&shared);
        let ticker = std::thread::Builder::new()
            .name("tempobench-ticker".into())
            .spawn(move || {
                loop {
                    std::thread::sleep(Duration::from_micros(TICK_MICROS));
                    let kind = ClockKind::from_u8(ticker_shared.kind.load(Ordering::Relaxed));
                    ticker_shared
                        .approx_micros
                        .store(kind.now_micros(), Ordering::Relaxed);
                    if ticker_shared.shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
            })
            .expect("failed to spawn clock ticker thread");

        FastClock {
            shared,
            ticker: Some(ticker),
        }
    }

    /// Whether the cached reading is at or past `when_micros`. One
    /// relaxed load; cheap enough to call every iteration.
    #[inline]
    pub fn has_reached(&self, when_micros: i64) -> bool {
        self.shared.approx_micros.load(Ordering::Relaxed) >= when_micros
    }

    /// Exact reading of the underlying source, in microseconds.
    pub fn now_micros(&self) -> i64 {
        ClockKind::from_u8(self.shared.kind.load(Ordering::Relaxed)).now_micros()
    }

    /// Switch the underlying source and reset the cached reading from it.
    ///
    /// The clock type may change between construction and first use,
    /// because the user routine can request real time during setup.
    pub fn set_kind(&self, kind: ClockKind) {
        self.shared.kind.store(kind.as_u8(), Ordering::Relaxed);
        self.shared
            .approx_micros
            .store(kind.now_micros(), Ordering::Relaxed);
    }
}

impl Drop for FastClock {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }
}
