use std::cell::RefCell;
use std::sync::Arc;

use crate::context::RequestContext;

thread_local! {
    static STACK: RefCell<Vec<Arc<RequestContext>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the context currently on top of this thread's stack, if any.
pub fn current() -> Option<Arc<RequestContext>> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Pushes `ctx` onto this thread's context stack. Re-entrant pushes of the
/// same context (by pointer identity) are no-ops that still hand back a
/// guard, matching the no-callback-run semantics required for replacement
/// without invocation (§4.11).
#[must_use = "the pushed context is popped when this guard drops"]
pub fn push(ctx: Arc<RequestContext>) -> PushGuard {
    let reentrant = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(top) = stack.last() {
            if Arc::ptr_eq(top, &ctx) {
                return true;
            }
            let top = Arc::clone(top);
            drop(stack);
            top.run_on_child(&ctx);
            stack = STACK.with(|s| s.borrow_mut());
            stack.push(Arc::clone(&ctx));
            return false;
        }
        stack.push(Arc::clone(&ctx));
        false
    });

    if !reentrant {
        ctx.run_on_enter();
    }

    PushGuard {
        ctx: reentrant.then_some(ctx),
    }
}

/// Pops the pushed context on drop and runs its exit callbacks, unless the
/// push that produced this guard was a reentrant no-op.
pub struct PushGuard {
    /// `Some` only for the reentrant no-op case, retained so the guard
    /// isn't entirely zero-sized and `current()` stays accurate if someone
    /// inspects it; the real stack entry is left untouched on drop.
    ctx: Option<Arc<RequestContext>>,
}

impl Drop for PushGuard {
    fn drop(&mut self) {
        if self.ctx.is_some() {
            return;
        }
        let popped = STACK.with(|stack| stack.borrow_mut().pop());
        if let Some(popped) = popped {
            popped.run_on_exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionProtocol;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> Arc<RequestContext> {
        RequestContext::builder(SessionProtocol::H2, "GET", "/foo").build()
    }

    #[test]
    fn push_pop_restores_prior_context() {
        assert!(current().is_none());
        let outer = ctx();
        let guard1 = push(outer.clone());
        assert!(Arc::ptr_eq(&current().unwrap(), &outer));

        let inner = ctx();
        let guard2 = push(inner.clone());
        assert!(Arc::ptr_eq(&current().unwrap(), &inner));

        drop(guard2);
        assert!(Arc::ptr_eq(&current().unwrap(), &outer));
        drop(guard1);
        assert!(current().is_none());
    }

    #[test]
    fn reentrant_push_is_a_no_op() {
        let c = ctx();
        let enters = Arc::new(AtomicUsize::new(0));
        let enters2 = Arc::clone(&enters);
        c.on_enter(move |_| {
            enters2.fetch_add(1, Ordering::SeqCst);
        });

        let guard1 = push(c.clone());
        assert_eq!(enters.load(Ordering::SeqCst), 1);
        let guard2 = push(c.clone());
        assert_eq!(enters.load(Ordering::SeqCst), 1, "reentrant push must not re-run on_enter");

        drop(guard2);
        assert!(Arc::ptr_eq(&current().unwrap(), &c));
        drop(guard1);
        assert!(current().is_none());
    }

    #[test]
    fn on_child_fires_for_a_distinct_nested_context() {
        let parent = ctx();
        let saw_child = Arc::new(AtomicUsize::new(0));
        let saw_child2 = Arc::clone(&saw_child);
        parent.on_child(move |_parent, _child| {
            saw_child2.fetch_add(1, Ordering::SeqCst);
        });

        let _g1 = push(parent.clone());
        let child = ctx();
        let _g2 = push(child);
        assert_eq!(saw_child.load(Ordering::SeqCst), 1);
    }
}
