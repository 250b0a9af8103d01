//! Scheduling helpers for stream worker threads

use crate::camera::StreamInitHook;
use std::io;
use std::sync::Arc;

/// Realtime priority requested for stream threads (SCHED_RR)
pub const REALTIME_PRIORITY: i32 = 10;
/// Nice value used when realtime scheduling is refused
pub const HIGH_PRIORITY_NICE: i32 = -10;

/// Priority level obtained by [`elevate_current_thread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPriority {
    Realtime,
    High,
}

/// Switch the calling thread to round-robin realtime scheduling
#[cfg(target_os = "linux")]
pub fn make_thread_realtime(priority: i32) -> io::Result<()> {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority;
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param);
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn make_thread_realtime(_priority: i32) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "realtime scheduling"))
}

/// Lower the nice value of the calling thread
#[cfg(target_os = "linux")]
pub fn make_thread_high_priority(nice: i32) -> io::Result<()> {
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        if libc::setpriority(libc::PRIO_PROCESS, tid, nice) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn make_thread_high_priority(_nice: i32) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "thread nice value"))
}

/// Realtime first, then high priority
pub fn elevate_current_thread() -> io::Result<ThreadPriority> {
    match make_thread_realtime(REALTIME_PRIORITY) {
        Ok(()) => Ok(ThreadPriority::Realtime),
        Err(_) => make_thread_high_priority(HIGH_PRIORITY_NICE).map(|_| ThreadPriority::High),
    }
}

/// Pin the calling thread to `core`; false if the core does not exist
pub fn pin_current_thread(core: usize) -> bool {
    core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
        .map(core_affinity::set_for_current)
        .unwrap_or(false)
}

/// Init hook for device streams: elevate and optionally pin the worker
///
/// Failures are logged; the stream runs at normal priority.
pub fn stream_init_hook(realtime: bool, core: Option<usize>) -> StreamInitHook {
    Arc::new(move || {
        if realtime {
            match elevate_current_thread() {
                Ok(level) => log::debug!("stream thread priority: {:?}", level),
                Err(e) => log::warn!("failed to make stream thread high priority: {}", e),
            }
        }

        if let Some(core) = core {
            if !pin_current_thread(core) {
                log::warn!("failed to pin stream thread to core {}", core);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pin_to_missing_core_fails() {
        let pinned = thread::spawn(|| pin_current_thread(usize::MAX)).join().unwrap();
        assert!(!pinned);
    }

    #[test]
    fn test_init_hook_never_panics() {
        // Elevation usually fails without CAP_SYS_NICE; the hook only logs
        let hook = stream_init_hook(true, Some(usize::MAX));
        thread::spawn(move || hook()).join().unwrap();
    }
}
