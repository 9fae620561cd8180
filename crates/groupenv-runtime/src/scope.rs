//! Ambient "current loading context" for the calling thread.
//!
//! Factories that need to resolve further types call [`current`] instead of
//! capturing a context. The ambient value is only ever changed through
//! [`with_context`], whose guard restores the previous value on every exit
//! path, unwinding included.

use std::cell::RefCell;
use std::sync::Arc;

use crate::context::LoadingContext;

thread_local! {
    static CURRENT: RefCell<Option<Arc<LoadingContext>>> = const { RefCell::new(None) };
}

/// The loading context installed on this thread, if any.
pub fn current() -> Option<Arc<LoadingContext>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Run `f` with `ctx` installed as the thread's current loading context.
pub fn with_context<F, R>(ctx: &Arc<LoadingContext>, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ContextGuard::install(Arc::clone(ctx));
    f()
}

struct ContextGuard {
    previous: Option<Arc<LoadingContext>>,
}

impl ContextGuard {
    fn install(ctx: Arc<LoadingContext>) -> Self {
        let previous = CURRENT.with(|c| c.borrow_mut().replace(ctx));
        Self { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextBuilder, PlatformBase};
    use crate::loader::NativeLoader;

    fn empty_context(group: &str) -> Arc<LoadingContext> {
        ContextBuilder::new(PlatformBase::empty(), Arc::new(NativeLoader)).build(group, &[])
    }

    #[test]
    fn test_nested_scopes_restore_previous() {
        let outer = empty_context("outer");
        let inner = empty_context("inner");
        assert!(current().is_none());
        with_context(&outer, || {
            assert_eq!(current().unwrap().id(), outer.id());
            with_context(&inner, || {
                assert_eq!(current().unwrap().id(), inner.id());
            });
            assert_eq!(current().unwrap().id(), outer.id());
        });
        assert!(current().is_none());
    }

    #[test]
    fn test_restored_after_panic() {
        let ctx = empty_context("panicky");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_context(&ctx, || panic!("factory blew up"));
        }));
        assert!(result.is_err());
        assert!(current().is_none());
    }

    #[test]
    fn test_scope_is_per_thread() {
        let ctx = empty_context("threaded");
        with_context(&ctx, || {
            let seen = std::thread::spawn(|| current().is_some()).join().unwrap();
            assert!(!seen);
        });
    }
}
