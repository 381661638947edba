use std::sync::Arc;

use simpleserial_frame::Message;
use tracing::warn;

use crate::error::LinkFailure;

/// Called synchronously for every decoded message.
pub type MessageHandler = Box<dyn FnMut(Message) + Send>;

/// Called once per fatal failure, before the failing loop returns.
pub type ErrorHandler = Arc<dyn Fn(LinkFailure) + Send + Sync>;

/// Fan-out point for fatal failures: always logs, then calls the registered
/// handler if there is one.
#[derive(Clone, Default)]
pub(crate) struct FailureSink {
    handler: Option<ErrorHandler>,
}

impl FailureSink {
    pub(crate) fn set(&mut self, handler: ErrorHandler) {
        self.handler = Some(handler);
    }

    pub(crate) fn notify(&self, failure: LinkFailure) {
        warn!(reason = failure.as_str(), "link failure");
        if let Some(handler) = &self.handler {
            handler(failure);
        }
    }
}

impl std::fmt::Debug for FailureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureSink")
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
