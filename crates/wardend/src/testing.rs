//! Recording backend doubles shared by the daemon's unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use warden_bus::DpReply;
use warden_providers::{
    BackendModule, ModuleCatalog, ModuleInitContext, ProviderError, Request, RequestPayload,
    TargetKind, TargetOps,
};

thread_local! {
    static ACTIVE_STATE: RefCell<Option<RecordingState>> = RefCell::new(None);
}

#[derive(Default)]
struct RecordingStateInner {
    instantiations: Cell<usize>,
    handled: RefCell<Vec<RequestPayload>>,
    finalized: RefCell<Vec<TargetKind>>,
    pam_status: Cell<Option<u32>>,
    drop_requests: Cell<bool>,
    fail_finalize: RefCell<Vec<TargetKind>>,
    fail_init: RefCell<Vec<(TargetKind, String)>>,
}

/// Shared observation and configuration point for recording doubles.
#[derive(Default, Clone)]
pub struct RecordingState {
    inner: Rc<RecordingStateInner>,
}

impl RecordingState {
    /// Number of module instantiations performed through the catalog.
    pub fn instantiations(&self) -> usize {
        self.inner.instantiations.get()
    }

    /// Payloads the recording targets have handled, in order.
    pub fn handled(&self) -> Vec<RequestPayload> {
        self.inner.handled.borrow().clone()
    }

    /// Target kinds finalized so far, in order.
    pub fn finalized(&self) -> Vec<TargetKind> {
        self.inner.finalized.borrow().clone()
    }

    /// Makes targets write this PAM status into handled PAM payloads.
    pub fn set_pam_status(&self, status: u32) {
        self.inner.pam_status.set(Some(status));
    }

    /// Makes targets drop requests instead of completing them.
    pub fn set_drop_requests(&self, drop_requests: bool) {
        self.inner.drop_requests.set(drop_requests);
    }

    /// Makes finalize fail for the given kind.
    pub fn fail_finalize(&self, kind: TargetKind) {
        self.inner.fail_finalize.borrow_mut().push(kind);
    }

    /// Makes target initialization fail for the given kind.
    pub fn fail_init(&self, kind: TargetKind, message: impl Into<String>) {
        self.inner.fail_init.borrow_mut().push((kind, message.into()));
    }

    /// Builds a recording target directly, bypassing the catalog.
    pub fn target(&self, kind: TargetKind) -> Rc<RefCell<dyn TargetOps>> {
        Rc::new(RefCell::new(RecordingTarget {
            kind,
            state: self.clone(),
        }))
    }
}

/// Builds a catalog with one `recording` module wired to `state`.
///
/// Module factories are plain function pointers, so the state travels
/// through a thread-local installed here and read by the factory.
pub fn recording_catalog(state: &RecordingState) -> ModuleCatalog {
    ACTIVE_STATE.with(|slot| *slot.borrow_mut() = Some(state.clone()));
    ModuleCatalog::new().with_module("recording", recording_factory)
}

fn recording_factory() -> Rc<RefCell<dyn BackendModule>> {
    let state = ACTIVE_STATE
        .with(|slot| slot.borrow().clone())
        .unwrap_or_default();
    state
        .inner
        .instantiations
        .set(state.inner.instantiations.get() + 1);
    Rc::new(RefCell::new(RecordingModule { state }))
}

struct RecordingModule {
    state: RecordingState,
}

impl BackendModule for RecordingModule {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn init_target(
        &mut self,
        kind: TargetKind,
        _context: &ModuleInitContext<'_>,
    ) -> Result<Rc<RefCell<dyn TargetOps>>, ProviderError> {
        let failure = self
            .state
            .inner
            .fail_init
            .borrow()
            .iter()
            .find(|(failing, _)| *failing == kind)
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(ProviderError::init_failed("recording", kind, message));
        }
        Ok(self.state.target(kind))
    }
}

struct RecordingTarget {
    kind: TargetKind,
    state: RecordingState,
}

impl TargetOps for RecordingTarget {
    fn handle(&mut self, mut request: Request) {
        if let Some(status) = self.state.inner.pam_status.get() {
            if let RequestPayload::Pam(pam) = request.payload_mut() {
                pam.pam_status = status;
            }
        }
        self.state
            .inner
            .handled
            .borrow_mut()
            .push(request.payload().clone());
        if self.state.inner.drop_requests.get() {
            drop(request);
        } else {
            request.complete(DpReply::success());
        }
    }

    fn finalize(&mut self) -> Result<(), ProviderError> {
        self.state.inner.finalized.borrow_mut().push(self.kind);
        if self.state.inner.fail_finalize.borrow().contains(&self.kind) {
            return Err(ProviderError::finalize(self.kind, "induced failure"));
        }
        Ok(())
    }
}
