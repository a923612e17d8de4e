//! Process CPU accounting for timed loop phases.
//!
//! Wall time alone hides how busy the team was. A phase that keeps `T`
//! workers fully occupied consumes roughly `T * wall` of user CPU; spin
//! waiting at region barriers shows up here too, which is the point.
//!
//! `getrusage` is a syscall. Sample at phase boundaries, never per chunk.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Cumulative CPU usage of this process at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuSample {
    pub user: Duration,
    pub sys: Duration,
    /// Peak resident set size in bytes. Zero where the unit is unknown.
    pub max_rss_bytes: u64,
}

impl CpuSample {
    /// Sample the current process. All zero if the call fails.
    pub fn now() -> Self {
        sample_self()
    }

    /// CPU consumed between `earlier` and `self`.
    ///
    /// RSS is a high-water mark, so the delta carries the ending value.
    pub fn since(&self, earlier: &CpuSample) -> CpuDelta {
        CpuDelta {
            user: self.user.saturating_sub(earlier.user),
            sys: self.sys.saturating_sub(earlier.sys),
            peak_rss_bytes: self.max_rss_bytes,
        }
    }
}

/// CPU consumed by one phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CpuDelta {
    #[serde(serialize_with = "serialize_secs")]
    pub user: Duration,
    #[serde(serialize_with = "serialize_secs")]
    pub sys: Duration,
    pub peak_rss_bytes: u64,
}

impl CpuDelta {
    #[inline]
    pub fn total(&self) -> Duration {
        self.user.saturating_add(self.sys)
    }

    /// Average number of busy cores over `wall`.
    pub fn utilization(&self, wall: Duration) -> f64 {
        if wall.is_zero() {
            return 0.0;
        }
        self.total().as_secs_f64() / wall.as_secs_f64()
    }
}

impl fmt::Display for CpuDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user={:.3}s sys={:.3}s peak_rss={}KiB",
            self.user.as_secs_f64(),
            self.sys.as_secs_f64(),
            self.peak_rss_bytes / 1024
        )
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(unix)]
#[inline]
fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = if tv.tv_sec < 0 { 0 } else { tv.tv_sec as u64 };
    let usec = tv.tv_usec.clamp(0, 999_999) as u64;
    Duration::from_secs(secs) + Duration::from_micros(usec)
}

#[cfg(unix)]
#[inline]
fn maxrss_to_bytes(ru_maxrss: libc::c_long) -> u64 {
    let raw = if ru_maxrss <= 0 { 0 } else { ru_maxrss as u64 };

    // KiB everywhere except macOS, which reports bytes.
    #[cfg(target_os = "macos")]
    {
        raw
    }
    #[cfg(not(target_os = "macos"))]
    {
        raw.saturating_mul(1024)
    }
}

#[cfg(unix)]
fn sample_self() -> CpuSample {
    // SAFETY: an all-zero rusage is a valid value; getrusage only writes it.
    let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
    // SAFETY: `ru` is a valid, exclusively borrowed out-pointer.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut ru) };
    if rc != 0 {
        return CpuSample::default();
    }
    CpuSample {
        user: timeval_to_duration(ru.ru_utime),
        sys: timeval_to_duration(ru.ru_stime),
        max_rss_bytes: maxrss_to_bytes(ru.ru_maxrss),
    }
}

#[cfg(not(unix))]
fn sample_self() -> CpuSample {
    CpuSample::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_saturates_when_clock_goes_backwards() {
        let later = CpuSample {
            user: Duration::from_millis(5),
            sys: Duration::from_millis(1),
            max_rss_bytes: 10,
        };
        let earlier = CpuSample {
            user: Duration::from_millis(8),
            sys: Duration::ZERO,
            max_rss_bytes: 4,
        };
        let d = later.since(&earlier);
        assert_eq!(d.user, Duration::ZERO);
        assert_eq!(d.sys, Duration::from_millis(1));
        assert_eq!(d.peak_rss_bytes, 10);
    }

    #[test]
    fn utilization_of_zero_wall_is_zero() {
        let d = CpuDelta {
            user: Duration::from_secs(2),
            ..CpuDelta::default()
        };
        assert_eq!(d.utilization(Duration::ZERO), 0.0);
        assert!((d.utilization(Duration::from_secs(1)) - 2.0).abs() < 1e-12);
    }

    #[cfg(unix)]
    #[test]
    fn busy_work_consumes_user_time() {
        let before = CpuSample::now();
        let mut acc = 0.0f64;
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(30) {
            for i in 0..10_000 {
                acc += (i as f64).sqrt();
            }
        }
        std::hint::black_box(acc);
        let after = CpuSample::now();
        let d = after.since(&before);
        assert!(d.total() > Duration::ZERO);
        assert!(after.max_rss_bytes > 0);
    }

    #[cfg(unix)]
    #[test]
    fn timeval_clamps_out_of_range_fields() {
        let tv = libc::timeval {
            tv_sec: -3,
            tv_usec: 2_000_000,
        };
        assert_eq!(timeval_to_duration(tv), Duration::from_micros(999_999));
    }
}
