use std::time::Duration;

/// Sleeps with sub-millisecond accuracy where the platform allows it.
///
/// The loop pacing the experiment frames calls this between ticks; ordinary
/// `thread::sleep` granularity is too coarse to hold a 90 Hz cadence.
pub fn precise_sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

    let req = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };

    unsafe {
        clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
    }
}
