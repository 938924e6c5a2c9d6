mod dispatcher;
mod listeners;

pub use dispatcher::{EventDispatcher, OutcomeListener};
pub use listeners::{LoggingListener, RecordingListener};
