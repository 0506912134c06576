//! Detaching forked serving processes from the caller's environment.

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{chdir, close, dup2};

/// Point the child's stdio at /dev/null and release the working directory,
/// so the serving process neither scribbles on the parent's terminal nor
/// pins a mount.
///
/// Best effort: a child that cannot detach can still serve the selection.
pub(crate) fn detach() {
    if let Ok(null) = open("/dev/null", OFlag::O_RDWR, Mode::empty()) {
        let _ = dup2(null, 0);
        let _ = dup2(null, 1);
        let _ = dup2(null, 2);
        if null > 2 {
            let _ = close(null);
        }
    }
    let _ = chdir("/");
}
