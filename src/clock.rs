//! Monotonic timing of a single invocation.

use std::hint::black_box;
use std::time::Instant;

/// Convert a `Duration` to fractional milliseconds.
#[inline]
pub fn as_ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Time one call of `op`, returning its output and the elapsed milliseconds.
///
/// `Instant` is monotonic, so wall-clock adjustments never show up in a sample.
pub fn measure<T>(op: impl FnOnce() -> T) -> (T, f64) {
    let start = Instant::now();
    let out = black_box(op());
    let elapsed = start.elapsed();
    (out, as_ms(elapsed))
}

/// Like [`measure`], but a failing operation yields no sample at all.
pub fn measure_fallible<T, E>(op: impl FnOnce() -> Result<T, E>) -> Result<(T, f64), E> {
    let start = Instant::now();
    let out = black_box(op());
    let elapsed = start.elapsed();
    out.map(|v| (v, as_ms(elapsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_measure_covers_sleep() {
        let (v, ms) = measure(|| {
            std::thread::sleep(Duration::from_millis(5));
            7
        });
        assert_eq!(v, 7);
        assert!(ms >= 5.0, "elapsed {ms} < 5ms");
    }

    #[test]
    fn test_measure_fallible_propagates() {
        let r: Result<(u8, f64), &str> = measure_fallible(|| Err("boom"));
        assert_eq!(r.unwrap_err(), "boom");
    }

    #[test]
    fn test_measure_is_non_negative() {
        let ((), ms) = measure(|| ());
        assert!(ms >= 0.0);
    }
}
