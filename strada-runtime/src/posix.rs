//! POSIX surface (§4.12): fixed Value-level shapes over a grab-bag of
//! syscalls. Every wrapper here returns exactly the Hash/Array shape the
//! spec's contract table names — nothing more, nothing derived.
//!
//! Built directly on `libc` rather than `nix`'s higher-level wrappers for
//! most of these: the contract is a fixed C `struct` layout (`stat`,
//! `rusage`, `tm`, `passwd`, `group`, `rlimit`) copied field-by-field into
//! a Hash, which is exactly what `libc`'s raw struct definitions are for.
//! `nix` is used where it meaningfully reduces unsafe surface (signal
//! name/number mapping).

use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;
use std::sync::Mutex;

use strada_core::value::{ValuePtr, new_array, new_hash, strada_new_int, strada_new_str_len, strada_new_undef};
use strada_core::{ArrayBody, DictBody};

fn hash_set_int(body: &mut DictBody, key: &str, value: i64) {
    let v = strada_new_int(value);
    body.set(key.as_bytes(), v, true);
}

fn hash_set_str(body: &mut DictBody, key: &str, value: &[u8]) {
    let v = unsafe { strada_new_str_len(value.as_ptr(), value.len()) };
    body.set(key.as_bytes(), v, true);
}

fn wrap_hash(body: DictBody) -> ValuePtr {
    new_hash(body)
}

// --- stat / lstat ----------------------------------------------------------

fn stat_to_hash(st: &libc::stat) -> ValuePtr {
    let mut body = DictBody::new();
    hash_set_int(&mut body, "dev", st.st_dev as i64);
    hash_set_int(&mut body, "ino", st.st_ino as i64);
    hash_set_int(&mut body, "mode", st.st_mode as i64);
    hash_set_int(&mut body, "nlink", st.st_nlink as i64);
    hash_set_int(&mut body, "uid", st.st_uid as i64);
    hash_set_int(&mut body, "gid", st.st_gid as i64);
    hash_set_int(&mut body, "rdev", st.st_rdev as i64);
    hash_set_int(&mut body, "size", st.st_size);
    hash_set_int(&mut body, "atime", st.st_atime);
    hash_set_int(&mut body, "mtime", st.st_mtime);
    hash_set_int(&mut body, "ctime", st.st_ctime);
    hash_set_int(&mut body, "blksize", st.st_blksize as i64);
    hash_set_int(&mut body, "blocks", st.st_blocks);
    wrap_hash(body)
}

fn do_stat(path: &[u8], follow_symlinks: bool) -> ValuePtr {
    let Ok(cpath) = CString::new(path) else {
        return strada_new_undef();
    };
    let mut st = MaybeUninit::<libc::stat>::uninit();
    let rc = if follow_symlinks {
        unsafe { libc::stat(cpath.as_ptr(), st.as_mut_ptr()) }
    } else {
        unsafe { libc::lstat(cpath.as_ptr(), st.as_mut_ptr()) }
    };
    if rc != 0 {
        return strada_new_undef();
    }
    stat_to_hash(&unsafe { st.assume_init() })
}

pub fn stat(path: &[u8]) -> ValuePtr {
    do_stat(path, true)
}

pub fn lstat(path: &[u8]) -> ValuePtr {
    do_stat(path, false)
}

// --- pipe --------------------------------------------------------------

/// Returns a two-element Array `[read_fd, write_fd]`, or Undef on failure.
pub fn pipe() -> ValuePtr {
    let mut fds = [0i32; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return strada_new_undef();
    }
    let mut body = ArrayBody::new();
    body.push(strada_new_int(fds[0] as i64), true);
    body.push(strada_new_int(fds[1] as i64), true);
    new_array(body)
}

// --- gettimeofday --------------------------------------------------------

pub fn gettimeofday() -> ValuePtr {
    let mut tv = MaybeUninit::<libc::timeval>::uninit();
    let rc = unsafe { libc::gettimeofday(tv.as_mut_ptr(), std::ptr::null_mut()) };
    let mut body = DictBody::new();
    if rc == 0 {
        let tv = unsafe { tv.assume_init() };
        hash_set_int(&mut body, "sec", tv.tv_sec as i64);
        hash_set_int(&mut body, "usec", tv.tv_usec as i64);
    } else {
        hash_set_int(&mut body, "sec", 0);
        hash_set_int(&mut body, "usec", 0);
    }
    wrap_hash(body)
}

// --- localtime / gmtime --------------------------------------------------

fn tm_to_hash(tm: &libc::tm) -> ValuePtr {
    let mut body = DictBody::new();
    hash_set_int(&mut body, "sec", tm.tm_sec as i64);
    hash_set_int(&mut body, "min", tm.tm_min as i64);
    hash_set_int(&mut body, "hour", tm.tm_hour as i64);
    hash_set_int(&mut body, "mday", tm.tm_mday as i64);
    hash_set_int(&mut body, "mon", tm.tm_mon as i64);
    hash_set_int(&mut body, "year", tm.tm_year as i64);
    hash_set_int(&mut body, "wday", tm.tm_wday as i64);
    hash_set_int(&mut body, "yday", tm.tm_yday as i64);
    hash_set_int(&mut body, "isdst", tm.tm_isdst as i64);
    wrap_hash(body)
}

pub fn localtime(epoch_sec: i64) -> ValuePtr {
    let t = epoch_sec as libc::time_t;
    let mut out = MaybeUninit::<libc::tm>::uninit();
    let result = unsafe { libc::localtime_r(&t, out.as_mut_ptr()) };
    if result.is_null() {
        return strada_new_undef();
    }
    tm_to_hash(&unsafe { out.assume_init() })
}

pub fn gmtime(epoch_sec: i64) -> ValuePtr {
    let t = epoch_sec as libc::time_t;
    let mut out = MaybeUninit::<libc::tm>::uninit();
    let result = unsafe { libc::gmtime_r(&t, out.as_mut_ptr()) };
    if result.is_null() {
        return strada_new_undef();
    }
    tm_to_hash(&unsafe { out.assume_init() })
}

// --- getpwnam / getpwuid / getgrnam / getgrgid ----------------------------

fn passwd_to_hash(pw: &libc::passwd) -> ValuePtr {
    let mut body = DictBody::new();
    hash_set_str(&mut body, "name", unsafe { CStr::from_ptr(pw.pw_name) }.to_bytes());
    hash_set_str(&mut body, "passwd", unsafe { CStr::from_ptr(pw.pw_passwd) }.to_bytes());
    hash_set_int(&mut body, "uid", pw.pw_uid as i64);
    hash_set_int(&mut body, "gid", pw.pw_gid as i64);
    hash_set_str(&mut body, "gecos", unsafe { CStr::from_ptr(pw.pw_gecos) }.to_bytes());
    hash_set_str(&mut body, "dir", unsafe { CStr::from_ptr(pw.pw_dir) }.to_bytes());
    hash_set_str(&mut body, "shell", unsafe { CStr::from_ptr(pw.pw_shell) }.to_bytes());
    wrap_hash(body)
}

pub fn getpwnam(name: &[u8]) -> ValuePtr {
    let Ok(cname) = CString::new(name) else {
        return strada_new_undef();
    };
    let pw = unsafe { libc::getpwnam(cname.as_ptr()) };
    if pw.is_null() { strada_new_undef() } else { passwd_to_hash(&unsafe { *pw }) }
}

pub fn getpwuid(uid: u32) -> ValuePtr {
    let pw = unsafe { libc::getpwuid(uid) };
    if pw.is_null() { strada_new_undef() } else { passwd_to_hash(&unsafe { *pw }) }
}

fn group_to_hash(gr: &libc::group) -> ValuePtr {
    let mut body = DictBody::new();
    hash_set_str(&mut body, "name", unsafe { CStr::from_ptr(gr.gr_name) }.to_bytes());
    hash_set_str(&mut body, "passwd", unsafe { CStr::from_ptr(gr.gr_passwd) }.to_bytes());
    hash_set_int(&mut body, "gid", gr.gr_gid as i64);
    let mut members = ArrayBody::new();
    let mut i = 0;
    unsafe {
        loop {
            let entry = *gr.gr_mem.add(i);
            if entry.is_null() {
                break;
            }
            let bytes = CStr::from_ptr(entry).to_bytes();
            members.push(strada_new_str_len(bytes.as_ptr(), bytes.len()), true);
            i += 1;
        }
    }
    body.set(b"members", new_array(members), true);
    wrap_hash(body)
}

pub fn getgrnam(name: &[u8]) -> ValuePtr {
    let Ok(cname) = CString::new(name) else {
        return strada_new_undef();
    };
    let gr = unsafe { libc::getgrnam(cname.as_ptr()) };
    if gr.is_null() { strada_new_undef() } else { group_to_hash(&unsafe { *gr }) }
}

pub fn getgrgid(gid: u32) -> ValuePtr {
    let gr = unsafe { libc::getgrgid(gid) };
    if gr.is_null() { strada_new_undef() } else { group_to_hash(&unsafe { *gr }) }
}

// --- getrusage -------------------------------------------------------------

pub fn getrusage(who: i32) -> ValuePtr {
    let mut ru = MaybeUninit::<libc::rusage>::uninit();
    let rc = unsafe { libc::getrusage(who, ru.as_mut_ptr()) };
    if rc != 0 {
        return strada_new_undef();
    }
    let ru = unsafe { ru.assume_init() };
    let mut body = DictBody::new();
    hash_set_int(&mut body, "utime_sec", ru.ru_utime.tv_sec as i64);
    hash_set_int(&mut body, "utime_usec", ru.ru_utime.tv_usec as i64);
    hash_set_int(&mut body, "stime_sec", ru.ru_stime.tv_sec as i64);
    hash_set_int(&mut body, "stime_usec", ru.ru_stime.tv_usec as i64);
    hash_set_int(&mut body, "maxrss", ru.ru_maxrss);
    hash_set_int(&mut body, "minflt", ru.ru_minflt);
    hash_set_int(&mut body, "majflt", ru.ru_majflt);
    hash_set_int(&mut body, "nvcsw", ru.ru_nvcsw);
    hash_set_int(&mut body, "nivcsw", ru.ru_nivcsw);
    wrap_hash(body)
}

// --- getrlimit / setrlimit -------------------------------------------------

pub fn getrlimit(resource: i32) -> ValuePtr {
    let mut rl = MaybeUninit::<libc::rlimit>::uninit();
    let rc = unsafe { libc::getrlimit(resource as u32, rl.as_mut_ptr()) };
    if rc != 0 {
        return strada_new_undef();
    }
    let rl = unsafe { rl.assume_init() };
    let mut body = DictBody::new();
    hash_set_int(&mut body, "cur", rl.rlim_cur as i64);
    hash_set_int(&mut body, "max", rl.rlim_max as i64);
    wrap_hash(body)
}

pub fn setrlimit(resource: i32, cur: i64, max: i64) -> i32 {
    let rl = libc::rlimit {
        rlim_cur: cur as libc::rlim_t,
        rlim_max: max as libc::rlim_t,
    };
    unsafe { libc::setrlimit(resource as u32, &rl) }
}

// --- signals ---------------------------------------------------------------

/// Name → signal number mapping (§4.12's explicit minimum set).
pub fn signal_number(name: &str) -> Option<i32> {
    Some(match name {
        "INT" => libc::SIGINT,
        "TERM" => libc::SIGTERM,
        "HUP" => libc::SIGHUP,
        "QUIT" => libc::SIGQUIT,
        "USR1" => libc::SIGUSR1,
        "USR2" => libc::SIGUSR2,
        "ALRM" => libc::SIGALRM,
        "PIPE" => libc::SIGPIPE,
        "CHLD" => libc::SIGCHLD,
        "CONT" => libc::SIGCONT,
        "STOP" => libc::SIGSTOP,
        "TSTP" => libc::SIGTSTP,
        "SEGV" => libc::SIGSEGV,
        "ABRT" => libc::SIGABRT,
        "FPE" => libc::SIGFPE,
        "ILL" => libc::SIGILL,
        "BUS" => libc::SIGBUS,
        "WINCH" => libc::SIGWINCH,
        _ => return None,
    })
}

/// What a script asked for: a Closure to invoke, or one of the two
/// literal modes.
pub enum SignalDisposition {
    Ignore,
    Default,
    Handler(ValuePtr),
}

/// Closures are not safe to invoke directly from inside a real OS signal
/// handler (allocation, locking, and most of the runtime are all
/// off-limits there). Instead the registered OS handler only sets a flag;
/// script-level handlers actually run on the next call to
/// `dispatch_pending_signals`, which the generated event loop calls
/// between statements. This is the standard "self-pipe"-adjacent pattern
/// for bringing signals into a non-reentrant runtime safely.
static PENDING: Mutex<Vec<i32>> = Mutex::new(Vec::new());
#[derive(Clone, Copy)]
struct HandlerPtr(ValuePtr);
unsafe impl Send for HandlerPtr {}
unsafe impl Sync for HandlerPtr {}

static HANDLERS: Mutex<Vec<(i32, HandlerPtr)>> = Mutex::new(Vec::new());

extern "C" fn record_pending(signum: i32) {
    if let Ok(mut pending) = PENDING.try_lock() {
        pending.push(signum);
    }
}

/// Installs `disposition` for `signum`. A prior `Handler` registration
/// for the same signal is replaced and decref'd.
pub fn set_signal_handler(signum: i32, disposition: SignalDisposition) {
    let mut handlers = HANDLERS.lock().unwrap();
    handlers.retain(|&(s, HandlerPtr(old))| {
        if s == signum {
            unsafe { strada_core::value::strada_decref(old) };
            false
        } else {
            true
        }
    });
    match disposition {
        SignalDisposition::Ignore => unsafe {
            libc::signal(signum, libc::SIG_IGN);
        },
        SignalDisposition::Default => unsafe {
            libc::signal(signum, libc::SIG_DFL);
        },
        SignalDisposition::Handler(closure) => {
            handlers.push((signum, HandlerPtr(closure)));
            unsafe {
                libc::signal(signum, record_pending as libc::sighandler_t);
            }
        }
    }
}

/// Runs every Strada handler for signals that arrived since the last
/// call. Intended to be called from the generated program's main loop
/// between statements, never from inside an OS signal handler.
pub fn dispatch_pending_signals() {
    let pending: Vec<i32> = { std::mem::take(&mut *PENDING.lock().unwrap()) };
    if pending.is_empty() {
        return;
    }
    let handlers = HANDLERS.lock().unwrap();
    for signum in pending {
        if let Some(&(_, HandlerPtr(closure))) = handlers.iter().find(|&&(s, _)| s == signum) {
            unsafe {
                let result = crate::closures::call_with_no_args(closure);
                strada_core::value::strada_decref(result);
            }
        }
    }
}

// --- setproctitle -----------------------------------------------------------

struct ArgvBounds {
    start: *mut u8,
    len: usize,
}
unsafe impl Send for ArgvBounds {}

static ARGV_BOUNDS: Mutex<Option<ArgvBounds>> = Mutex::new(None);

/// Records the original argv (and, by extension, environment) memory
/// bounds at startup, so a later `setproctitle` can overwrite argv memory
/// in place up to that bound. Intended to be called once from the
/// generated `main()` before any Strada code runs.
///
/// # Safety
/// `argv[0..argc]` must be the process's real, contiguous argv vector.
pub unsafe fn record_argv_bounds(argc: i32, argv: *mut *mut libc::c_char) {
    if argc <= 0 || argv.is_null() {
        return;
    }
    let first = unsafe { *argv } as *mut u8;
    let mut total = 0usize;
    for i in 0..argc {
        let arg = unsafe { *argv.offset(i as isize) };
        if arg.is_null() {
            break;
        }
        total += unsafe { CStr::from_ptr(arg) }.to_bytes_with_nul().len();
    }
    *ARGV_BOUNDS.lock().unwrap() = Some(ArgvBounds { start: first, len: total });
}

/// Sets the process title. Uses `PR_SET_NAME` (Linux, ≤15 bytes) for the
/// short name every `ps`/`/proc` consumer checks first, and additionally
/// overwrites argv memory in place (truncated/null-padded to the
/// recorded bound) so that `ps aux`'s full command line reflects it too.
pub fn setproctitle(title: &[u8]) {
    let mut short = [0u8; 16];
    let n = title.len().min(15);
    short[..n].copy_from_slice(&title[..n]);
    unsafe {
        libc::prctl(libc::PR_SET_NAME, short.as_ptr() as usize, 0, 0, 0);
    }
    if let Some(bounds) = ARGV_BOUNDS.lock().unwrap().as_ref() {
        let n = title.len().min(bounds.len.saturating_sub(1));
        unsafe {
            std::ptr::copy_nonoverlapping(title.as_ptr(), bounds.start, n);
            std::ptr::write_bytes(bounds.start.add(n), 0, bounds.len - n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_on_known_path_returns_populated_hash() {
        let h = stat(b"/");
        match unsafe { (*h).kind() } {
            strada_core::ValueKind::Hash(hash) => assert!(hash.len() >= 13),
            other => panic!("expected Hash, got {other:?}"),
        }
        unsafe { strada_core::value::strada_decref(h) };
    }

    #[test]
    fn stat_on_missing_path_is_undef() {
        let h = stat(b"/definitely/does/not/exist/ever");
        assert!(matches!(unsafe { (*h).kind() }, strada_core::ValueKind::Undef));
        unsafe { strada_core::value::strada_decref(h) };
    }

    #[test]
    fn pipe_returns_two_valid_fds() {
        let p = pipe();
        match unsafe { (*p).kind() } {
            strada_core::ValueKind::Array(a) => assert_eq!(a.len(), 2),
            other => panic!("expected Array, got {other:?}"),
        }
        unsafe { strada_core::value::strada_decref(p) };
    }

    #[test]
    fn signal_number_covers_spec_minimum_set() {
        for name in ["INT", "TERM", "HUP", "QUIT", "USR1", "USR2", "ALRM", "PIPE", "CHLD", "CONT", "STOP", "TSTP", "SEGV", "ABRT", "FPE", "ILL", "BUS", "WINCH"] {
            assert!(signal_number(name).is_some(), "missing mapping for {name}");
        }
        assert!(signal_number("NOT_A_SIGNAL").is_none());
    }

    #[test]
    fn gettimeofday_returns_sec_and_usec() {
        let h = gettimeofday();
        match unsafe { (*h).kind() } {
            strada_core::ValueKind::Hash(hash) => assert_eq!(hash.len(), 2),
            other => panic!("expected Hash, got {other:?}"),
        }
        unsafe { strada_core::value::strada_decref(h) };
    }
}
