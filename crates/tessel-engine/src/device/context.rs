use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{RenderError, Result};

use super::GlBackend;

/// A GPU resource that can rebuild itself after the context is lost.
///
/// `restore` runs with a fresh context: handles held from before the loss are dead and must
/// be dropped without deleting them.
pub trait Restorable {
    /// Short name used in logs and restore reports.
    fn label(&self) -> &'static str;

    fn restore(&self, gl: &dyn GlBackend) -> Result<()>;
}

/// Registration key handed out by [`ManagedContext::add_restorable`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RestorableId(u64);

/// Outcome of [`ManagedContext::mark_restored`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Resources whose `restore` returned `Ok`.
    pub restored: usize,
    /// Failed resources, in registration order.
    pub failures: Vec<(&'static str, RenderError)>,
    /// Registry entries whose resource had already been dropped.
    pub pruned: usize,
}

impl RestoreReport {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the graphics backend and the registry of restorable resources.
///
/// Every resource constructor takes an `Rc<ManagedContext>` and registers itself; `dispose`
/// (or `Drop`) deregisters. The registry only holds `Weak` references, so it never keeps a
/// resource alive.
///
/// Invariant: a resource appears in the registry at most once, and restoration visits live
/// entries in registration order.
pub struct ManagedContext {
    gl: Box<dyn GlBackend>,
    lost: Cell<bool>,
    next_id: Cell<u64>,
    restorables: RefCell<Vec<(RestorableId, Weak<dyn Restorable>)>>,
}

impl ManagedContext {
    pub fn new(gl: impl GlBackend + 'static) -> Rc<Self> {
        Rc::new(Self {
            gl: Box::new(gl),
            lost: Cell::new(false),
            next_id: Cell::new(0),
            restorables: RefCell::new(Vec::new()),
        })
    }

    #[inline]
    pub fn gl(&self) -> &dyn GlBackend {
        self.gl.as_ref()
    }

    /// Returns `true` while the context is marked lost or the backend reports a loss.
    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost.get() || self.gl.is_context_lost()
    }

    // ── registry ──────────────────────────────────────────────────────────

    pub fn add_restorable(&self, restorable: Weak<dyn Restorable>) -> RestorableId {
        let id = RestorableId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.restorables.borrow_mut().push((id, restorable));
        id
    }

    /// Removes `id` from the registry. Returns `false` if it was not registered.
    pub fn remove_restorable(&self, id: RestorableId) -> bool {
        let mut list = self.restorables.borrow_mut();
        let Some(pos) = list.iter().position(|(rid, _)| *rid == id) else {
            return false;
        };
        list.remove(pos);
        true
    }

    /// Number of registered entries whose resource is still alive.
    pub fn restorable_count(&self) -> usize {
        self.restorables
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    // ── loss / restore ────────────────────────────────────────────────────

    /// Enters the lost state. Uploads and draws are skipped until [`Self::mark_restored`].
    pub fn mark_lost(&self) {
        if !self.lost.replace(true) {
            log::info!("graphics context lost");
        }
    }

    /// Leaves the lost state and restores every live resource in registration order.
    ///
    /// Failures do not stop the pass; each one is logged and reported.
    pub fn mark_restored(&self) -> RestoreReport {
        self.lost.set(false);

        let mut report = RestoreReport::default();
        let live: Vec<Rc<dyn Restorable>> = {
            let mut list = self.restorables.borrow_mut();
            let before = list.len();
            list.retain(|(_, weak)| weak.strong_count() > 0);
            report.pruned = before - list.len();
            list.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };

        if report.pruned > 0 {
            log::warn!(
                "pruned {} restorable(s) dropped without dispose()",
                report.pruned
            );
        }

        for resource in live {
            match resource.restore(self.gl()) {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    log::error!("couldn't restore {}: {e}", resource.label());
                    report.failures.push((resource.label(), e));
                }
            }
        }

        log::info!(
            "graphics context restored ({} resource(s), {} failure(s))",
            report.restored,
            report.failures.len()
        );
        report
    }
}

impl fmt::Debug for ManagedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedContext")
            .field("lost", &self.is_lost())
            .field("restorables", &self.restorables.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessBackend;

    struct Recorder {
        name: &'static str,
        order: Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    }

    impl Restorable for Recorder {
        fn label(&self) -> &'static str {
            self.name
        }

        fn restore(&self, _gl: &dyn GlBackend) -> Result<()> {
            self.order.borrow_mut().push(self.name);
            if self.fail {
                Err(RenderError::ResourceCreation("recorder"))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(
        ctx: &ManagedContext,
        name: &'static str,
        order: &Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    ) -> (Rc<Recorder>, RestorableId) {
        let p = Rc::new(Recorder {
            name,
            order: order.clone(),
            fail,
        });
        let weak: Weak<dyn Restorable> = Rc::downgrade(&p) as Weak<dyn Restorable>;
        let id = ctx.add_restorable(weak);
        (p, id)
    }

    #[test]
    fn restore_visits_registration_order() {
        let ctx = ManagedContext::new(HeadlessBackend::new());
        let order = Rc::new(RefCell::new(Vec::new()));
        let _a = recorder(&ctx, "a", &order, false);
        let _b = recorder(&ctx, "b", &order, true);
        let _c = recorder(&ctx, "c", &order, false);

        ctx.mark_lost();
        assert!(ctx.is_lost());
        let report = ctx.mark_restored();

        assert!(!ctx.is_lost());
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert_eq!(report.restored, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "b");
        assert!(!report.is_ok());
    }

    #[test]
    fn removed_and_dropped_entries_are_skipped() {
        let ctx = ManagedContext::new(HeadlessBackend::new());
        let order = Rc::new(RefCell::new(Vec::new()));
        let (_a, a_id) = recorder(&ctx, "a", &order, false);
        let (b, _) = recorder(&ctx, "b", &order, false);
        let _c = recorder(&ctx, "c", &order, false);

        assert!(ctx.remove_restorable(a_id));
        assert!(!ctx.remove_restorable(a_id));
        drop(b);
        assert_eq!(ctx.restorable_count(), 1);

        let report = ctx.mark_restored();
        assert_eq!(report.pruned, 1);
        assert_eq!(*order.borrow(), vec!["c"]);
    }

    #[test]
    fn backend_loss_counts_as_lost() {
        let gl = HeadlessBackend::new();
        let ctx = ManagedContext::new(gl.clone());
        assert!(!ctx.is_lost());
        gl.lose_context();
        assert!(ctx.is_lost());
        gl.restore_context();
        assert!(!ctx.is_lost());
    }
}
