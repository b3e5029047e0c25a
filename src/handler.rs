#[cfg(test)] use mockall::automock;
use tracing::{error, warn};

/// The application's side of the server: it is notified of complete messages, of sessions that
///  were evicted for being idle, and of everything that went wrong along the way.
///
/// All callbacks are invoked synchronously from inside [crate::server::Server::tick] (or the
///  server operation that triggered them). They must not block, and they cannot call back into
///  the server: replies should be queued and passed to [crate::server::Server::send] after the
///  tick returns.
#[cfg_attr(test, automock)]
pub trait SessionEventHandler: Send + Sync + 'static {
    /// A complete framed message arrived for a session. `message` is borrowed from the server's
    ///  scratch space and is only valid for the duration of the call.
    fn on_message(&self, conv: u32, message: &[u8]);

    /// A session was evicted because it had been idle for longer than the configured timeout.
    ///  Explicit calls to [crate::server::Server::kick] do *not* trigger this callback.
    fn on_idle_kick(&self, conv: u32) {
        let _ = conv;
    }

    /// Human-readable report of a dropped datagram, a failed operation or a session lifecycle
    ///  event. Everything reported here is also logged.
    fn on_error(&self, report: &str) {
        let _ = report;
    }
}

pub(crate) fn report_warn(handler: &dyn SessionEventHandler, report: &str) {
    warn!("{}", report);
    handler.on_error(report);
}

pub(crate) fn report_error(handler: &dyn SessionEventHandler, report: &str) {
    error!("{}", report);
    handler.on_error(report);
}
