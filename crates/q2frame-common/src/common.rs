// common.rs — console printing and error reporting routed through the log facade

use crate::q_shared::{ERR_DROP, ERR_FATAL};

/// General console print.
pub fn com_printf(msg: &str) {
    log::info!("{}", msg.trim_end());
}

/// Developer-only print. Visible when the log filter admits debug.
pub fn com_dprintf(msg: &str) {
    log::debug!("{}", msg.trim_end());
}

/// Engine error handler.
/// - `ERR_FATAL`: logs and panics.
/// - `ERR_DROP`: logs; the caller drops the offending input and carries on.
pub fn com_error(code: i32, msg: &str) {
    match code {
        ERR_FATAL => {
            log::error!("{}", msg);
            panic!("Fatal error: {}", msg);
        }
        ERR_DROP => log::error!("ERROR: {}", msg),
        _ => log::warn!("{}", msg),
    }
}

/// Milliseconds since the first call in this process. Monotonic.
pub fn sys_milliseconds() -> i32 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_error_does_not_panic() {
        com_error(ERR_DROP, "bad delta");
        com_printf("hello\n");
        com_dprintf("dev\n");
    }

    #[test]
    fn milliseconds_never_go_back() {
        let a = sys_milliseconds();
        let b = sys_milliseconds();
        assert!(b >= a);
    }

    #[test]
    #[should_panic(expected = "Fatal error")]
    fn fatal_error_panics() {
        com_error(ERR_FATAL, "boom");
    }
}
