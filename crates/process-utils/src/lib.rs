//! Child-process helpers shared across the workspace.
//!
//! Renderers spawn external tools that may print a lot and may never exit.
//! [`run_with_timeout`] drains both output pipes, keeps only their tails and
//! kills the child once the deadline passes.

#[cfg(feature = "tokio")]
mod run;

#[cfg(feature = "tokio")]
pub use run::{CommandOutcome, DEFAULT_TAIL_LINES, run_with_timeout};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppress the console window Windows opens for console children.
///
/// No-op elsewhere.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Build a `tokio::process::Command` that is killed when its handle drops.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}
