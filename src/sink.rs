//! Top-level sink for errors nobody else can handle.

use std::fmt::Debug;

use crate::Error;

/// Receives subscriber failures, dropped connections and background fetch failures
#[async_trait::async_trait]
pub trait ErrorSink: Debug + Send + Sync {
    /// report one error occurrence
    async fn report(&self, error: &Error);
}

/// Error sink writing to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait::async_trait]
impl ErrorSink for LogSink {
    async fn report(&self, error: &Error) {
        log::error!("{}", error);
    }
}

#[cfg(test)]
pub(crate) mod collect {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Keeps reported errors as strings
    #[derive(Debug, Default, Clone)]
    pub(crate) struct CollectSink {
        pub errors: Arc<Mutex<Vec<String>>>,
    }

    impl CollectSink {
        pub fn reported(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ErrorSink for CollectSink {
        async fn report(&self, error: &Error) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }
}
