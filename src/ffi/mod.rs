//! `pthread` symbol interposition
//!
//! Built as a `cdylib` and injected with `LD_PRELOAD`, this module replaces
//! the host's `pthread_create`, `pthread_mutex_lock` and
//! `pthread_mutex_unlock` entry points with wrappers of identical signature.
//! The real implementations are resolved once, by name, from the next object
//! in the dynamic-loader search order, and every wrapper delegates to them:
//! the host's return values and blocking behavior are untouched, the detector
//! only observes.
//!
//! Bootstrap is a run-once latch. The first hook call resolves the real
//! symbols and initializes the graph; concurrent first callers block on the
//! latch. If any symbol cannot be resolved the detector is disabled for the
//! remainder of the process and the wrappers become pure pass-throughs.
//!
//! Thread vertices on this path are keyed by `pthread_t`, mutex vertices by
//! the `pthread_mutex_t` address. The detector's own locks are `parking_lot`
//! primitives and its own threads are started outside the latch, so the
//! wrappers never re-enter themselves.

use crate::core::error::DetectorError;
use crate::core::types::{DEFAULT_MONITOR_PERIOD, MutexAddr, ThreadId};
use crate::core::{hooks, monitor, report_to_stderr};
use libc::{c_int, c_void, pthread_attr_t, pthread_mutex_t, pthread_t};
use std::ffi::CStr;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type PthreadCreateFn = unsafe extern "C" fn(
    *mut pthread_t,
    *const pthread_attr_t,
    extern "C" fn(*mut c_void) -> *mut c_void,
    *mut c_void,
) -> c_int;
type PthreadMutexFn = unsafe extern "C" fn(*mut pthread_mutex_t) -> c_int;

static BOOTSTRAP: Once = Once::new();
static READY: AtomicBool = AtomicBool::new(false);
static DISABLED: AtomicBool = AtomicBool::new(false);
static MONITOR_STARTED: AtomicBool = AtomicBool::new(false);

// Real implementations, stored as addresses. Zero means unresolved.
static REAL_CREATE: AtomicUsize = AtomicUsize::new(0);
static REAL_LOCK: AtomicUsize = AtomicUsize::new(0);
static REAL_UNLOCK: AtomicUsize = AtomicUsize::new(0);

/// Resolve a symbol from the next object in the loader's search order
fn resolve(name: &CStr) -> usize {
    unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) as usize }
}

/// One-shot initialization: resolve the real primitives and set up the graph.
///
/// Runs inside `Once`, so a hook that fires during another thread's bootstrap
/// blocks on the latch and observes the final state. Spawning threads in here
/// would re-enter `pthread_create` and thereby this latch, so the monitor is
/// started separately in [`ensure_monitor`].
fn bootstrap() {
    BOOTSTRAP.call_once(|| {
        let create = resolve(c"pthread_create");
        let lock = resolve(c"pthread_mutex_lock");
        let unlock = resolve(c"pthread_mutex_unlock");

        // Keep whatever resolved so pass-through still works where possible
        REAL_CREATE.store(create, Ordering::SeqCst);
        REAL_LOCK.store(lock, Ordering::SeqCst);
        REAL_UNLOCK.store(unlock, Ordering::SeqCst);

        for (addr, name) in [
            (create, "pthread_create"),
            (lock, "pthread_mutex_lock"),
            (unlock, "pthread_mutex_unlock"),
        ] {
            if addr == 0 {
                DISABLED.store(true, Ordering::SeqCst);
                eprintln!(
                    "lockgraph: detector disabled: {}",
                    DetectorError::SymbolResolution(name)
                );
                return;
            }
        }

        hooks::force_init();
        READY.store(true, Ordering::SeqCst);
    });
}

/// Start the monitor thread once the latch has completed.
///
/// The spawn goes through our own `pthread_create` wrapper; by the time it
/// runs, the latch is complete and the started flag is set, so it cannot
/// recurse into this function's spawn path.
fn ensure_monitor() {
    if READY.load(Ordering::SeqCst)
        && !MONITOR_STARTED.swap(true, Ordering::SeqCst)
    {
        let handle = monitor::spawn(
            DEFAULT_MONITOR_PERIOD,
            Box::new(|info| report_to_stderr(&info)),
        );
        crate::core::install_monitor(handle);
    }
}

fn tracking_enabled() -> bool {
    READY.load(Ordering::SeqCst) && !DISABLED.load(Ordering::SeqCst)
}

fn current_pthread_id() -> ThreadId {
    unsafe { libc::pthread_self() as ThreadId }
}

/// Interposed `pthread_create`.
///
/// Delegates to the real implementation and, on success, registers a thread
/// vertex for the new thread.
///
/// # Safety
/// Same contract as `pthread_create(3)`: `thread` must be a valid out
/// pointer, `attr` NULL or valid, and `arg` must satisfy whatever
/// `start_routine` expects.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pthread_create(
    thread: *mut pthread_t,
    attr: *const pthread_attr_t,
    start_routine: extern "C" fn(*mut c_void) -> *mut c_void,
    arg: *mut c_void,
) -> c_int {
    bootstrap();
    ensure_monitor();

    let real = REAL_CREATE.load(Ordering::SeqCst);
    if real == 0 {
        return libc::EAGAIN;
    }
    let real: PthreadCreateFn = unsafe { std::mem::transmute(real) };

    let result = unsafe { real(thread, attr, start_routine, arg) };
    if result == 0 && tracking_enabled() && !thread.is_null() {
        hooks::on_thread_create(unsafe { *thread } as ThreadId);
    }
    result
}

/// Interposed `pthread_mutex_lock`.
///
/// Adds the wait edge before entering the real (possibly blocking) call and
/// converts it to a hold edge once the call returns success. The return value
/// of the real call is passed through untouched.
///
/// # Safety
/// Same contract as `pthread_mutex_lock(3)`: `mutex` must point to an
/// initialized `pthread_mutex_t`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pthread_mutex_lock(mutex: *mut pthread_mutex_t) -> c_int {
    bootstrap();
    ensure_monitor();

    let real = REAL_LOCK.load(Ordering::SeqCst);
    if real == 0 {
        return libc::EINVAL;
    }
    let real: PthreadMutexFn = unsafe { std::mem::transmute(real) };

    let tracked = tracking_enabled() && !mutex.is_null();
    let thread_id = current_pthread_id();
    if tracked {
        hooks::on_before_lock(thread_id, mutex as MutexAddr);
    }
    let result = unsafe { real(mutex) };
    if tracked && result == 0 {
        hooks::on_after_lock(thread_id, mutex as MutexAddr);
    }
    result
}

/// Interposed `pthread_mutex_unlock`.
///
/// Removes the hold edge after the real call returns success.
///
/// # Safety
/// Same contract as `pthread_mutex_unlock(3)`: `mutex` must point to an
/// initialized `pthread_mutex_t` locked by the calling thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pthread_mutex_unlock(mutex: *mut pthread_mutex_t) -> c_int {
    bootstrap();

    let real = REAL_UNLOCK.load(Ordering::SeqCst);
    if real == 0 {
        return libc::EINVAL;
    }
    let real: PthreadMutexFn = unsafe { std::mem::transmute(real) };

    let tracked = tracking_enabled() && !mutex.is_null();
    let thread_id = current_pthread_id();
    if tracked {
        hooks::on_before_unlock(thread_id, mutex as MutexAddr);
    }
    let result = unsafe { real(mutex) };
    if tracked && result == 0 {
        hooks::on_after_unlock(thread_id, mutex as MutexAddr);
    }
    result
}
