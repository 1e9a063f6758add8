//! Platform-specific shell and signal handling.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// The shell used for string commands.
///
/// `/bin/sh` on Unix regardless of `$SHELL`; `COMSPEC` (or `cmd.exe`) on
/// Windows.
pub fn detect_shell() -> PathBuf {
    if cfg!(target_os = "windows") {
        std::env::var("COMSPEC")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cmd.exe"))
    } else {
        PathBuf::from("/bin/sh")
    }
}

/// Get the flag to pass a command string to the shell.
pub fn shell_flag() -> &'static str {
    if cfg!(target_os = "windows") {
        "/C"
    } else {
        "-c"
    }
}

/// Whether SIGINT or SIGTERM has been received since the handler was
/// installed.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Install handlers for SIGINT and SIGTERM that set the [`interrupted`]
/// flag. A second signal exits immediately with status 130.
#[cfg(unix)]
pub fn install_interrupt_handler() -> std::io::Result<()> {
    extern "C" fn handle(_signal: libc::c_int) {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // SAFETY: _exit is async-signal-safe
            unsafe { libc::_exit(130) };
        }
    }

    let handler = handle as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only touches an atomic and calls _exit
        if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() -> std::io::Result<()> {
    Ok(())
}

/// Send a signal to every process in a child's process group.
#[cfg(unix)]
pub(crate) fn signal_process_group(pid: u32, signal: libc::c_int) -> bool {
    // SAFETY: kill() has no memory-safety preconditions
    unsafe { libc::kill(-(pid as libc::pid_t), signal) == 0 }
}
