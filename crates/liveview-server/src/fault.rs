//! Fault containment at dispatch boundaries.
//!
//! Application callbacks run inside [`contain`] so a panicking handler drops
//! one event instead of taking down a connection loop, a scheduler or a
//! broadcast in progress.
//!
//! Callbacks are invoked inside the contained future, so a closure that
//! panics before returning its future is caught as well.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use metrics::counter;
use tracing::error;

use crate::metrics::HANDLER_FAULTS_TOTAL;

/// Await `fut`, converting a panic into `None`.
pub async fn contain<F, T>(scope: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Some(value),
        Err(payload) => {
            record(scope, payload.as_ref());
            None
        }
    }
}

/// Run `f`, converting a panic into `None`.
pub fn contain_sync<T>(scope: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            record(scope, payload.as_ref());
            None
        }
    }
}

fn record(scope: &'static str, payload: &(dyn Any + Send)) {
    counter!(HANDLER_FAULTS_TOTAL, "scope" => scope).increment(1);
    error!(scope, panic = %panic_message(payload), "contained panic");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_value_through() {
        let value = contain("test", async { 41 + 1 }).await;
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn panic_becomes_none() {
        let value: Option<()> = contain("test", async { panic!("boom") }).await;
        assert!(value.is_none());
    }

    #[test]
    fn sync_panic_becomes_none() {
        let value: Option<u8> = contain_sync("test", || panic!("sync boom"));
        assert!(value.is_none());
        assert_eq!(contain_sync("test", || 7), Some(7));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        let other: Box<dyn Any + Send> = Box::new(5_u32);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
