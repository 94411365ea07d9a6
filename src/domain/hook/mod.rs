pub mod dispatcher;
pub mod event;
pub mod registry;

pub use dispatcher::{DispatchReport, HookDispatcher, HookFailure, HookResolution};
pub use event::{HookEvent, HookEventKind, HookOutcome, JobView, ReservationView};
pub use registry::{HookRegistry, RegisteredHook};

/// An executable hook body.
///
/// Bodies are administrator-supplied strategy objects invoked through this
/// narrow interface; they get the read-only event view and nothing else.
/// A body is expected to settle the event's outcome at most once and to
/// return within the dispatcher's execution budget.
pub trait HookBody: Send + Sync {
    fn execute(&self, event: &mut HookEvent);
}

/// Adapter turning a closure into a hook body. The usual way tests and the
/// demo binary import hook code.
pub struct FnHook<F> {
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&mut HookEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnHook { f }
    }
}

impl<F> HookBody for FnHook<F>
where
    F: Fn(&mut HookEvent) + Send + Sync,
{
    fn execute(&self, event: &mut HookEvent) {
        (self.f)(event)
    }
}
