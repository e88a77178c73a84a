//! Process signal wiring for the `terminate` flag

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::debug;

use crate::types::StreamFlags;
use crate::{RelayError, Result};

/// Latch `terminate` on SIGINT or SIGTERM.
///
/// The handlers only store to the shared atomic, so the loop notices the
/// signal at the top of its next iteration. Registrations last for the life
/// of the process.
pub fn install_termination_handlers(flags: &StreamFlags) -> Result<()> {
    for (signal, name) in [(SIGINT, "SIGINT"), (SIGTERM, "SIGTERM")] {
        signal_hook::flag::register(signal, flags.terminate_handle())
            .map_err(|e| RelayError::device_error(format!("register {name} handler"), e))?;
        debug!("Installed {} handler", name);
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn sigterm_latches_terminate() {
        let flags = StreamFlags::new();
        install_termination_handlers(&flags).expect("install handlers");
        assert!(!flags.terminate_requested());

        // SAFETY: raise has no memory-safety preconditions; the handler
        // installed above replaces the default action.
        let rc = unsafe { libc::raise(SIGTERM) };
        assert_eq!(rc, 0);

        assert!(flags.terminate_requested());
    }
}
