//! Panic boundary around handler futures.
//!
//! A process-wide panic hook is installed on first use. While a handler
//! future is being polled, the hook records a backtrace of the panicking
//! frames into a thread-local slot and prints nothing; the classifier logs
//! it instead. Panics anywhere else go to the previous hook unchanged.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::future::{poll_fn, BoxFuture};
use futures_util::FutureExt;

use crate::dispatch::failure::Failure;

thread_local! {
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A panic caught at the handler boundary.
pub struct Panic {
    message: String,
    backtrace: Backtrace,
}

impl Panic {
    /// Wrap a panic payload. Without a backtrace from the panic site, one is
    /// taken here.
    pub fn new(payload: Box<dyn Any + Send>, backtrace: Option<Backtrace>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self {
            message,
            backtrace: backtrace.unwrap_or_else(Backtrace::force_capture),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Frames of the panicking thread at the moment of the panic.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Debug for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panic").field("message", &self.message).finish_non_exhaustive()
    }
}

/// Result of running one handler invocation inside the panic boundary.
pub type Caught<T> = Result<Result<T, Failure>, Panic>;

/// Drive `future` to completion, turning a panic into [`Panic`].
pub async fn catch_panic<T: 'static>(mut future: BoxFuture<'static, Result<T, Failure>>) -> Caught<T> {
    install_hook();
    let guarded = poll_fn(move |cx| {
        let _scope = HandlerScope::enter();
        future.as_mut().poll(cx)
    });
    match AssertUnwindSafe(guarded).catch_unwind().await {
        Ok(result) => Ok(result),
        Err(payload) => Err(Panic::new(payload, PANIC_TRACE.with(|slot| slot.borrow_mut().take()))),
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_HANDLER.with(Cell::get) {
                let trace = Backtrace::force_capture();
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as polling a handler until dropped.
struct HandlerScope {
    outer: bool,
}

impl HandlerScope {
    fn enter() -> Self {
        Self {
            outer: IN_HANDLER.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for HandlerScope {
    fn drop(&mut self) {
        IN_HANDLER.with(|flag| flag.set(self.outer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn exploding_lookup() -> Result<u32, Failure> {
        panic!("index out of range");
    }

    #[tokio::test]
    async fn panic_site_is_in_backtrace() {
        let caught = catch_panic(async { exploding_lookup() }.boxed()).await;
        let panic = caught.unwrap_err();
        assert_eq!(panic.message(), "index out of range");
        assert!(format!("{:?}", panic.backtrace()).contains("exploding_lookup"));
    }

    #[tokio::test]
    async fn values_and_failures_pass_through() {
        assert_eq!(catch_panic(async { Ok::<_, Failure>(7) }.boxed()).await.unwrap().unwrap(), 7);

        let caught = catch_panic(async { Err::<(), _>(Failure::forbidden(anyhow::anyhow!("no"))) }.boxed()).await;
        assert!(caught.unwrap().is_err());
    }

    #[test]
    fn scope_restores_flag() {
        {
            let _scope = HandlerScope::enter();
            assert!(IN_HANDLER.with(Cell::get));
        }
        assert!(!IN_HANDLER.with(Cell::get));
    }
}
