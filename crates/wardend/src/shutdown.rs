//! Ordered backend finalization before process exit.
//!
//! Triggered by a signal or by reconnect exhaustion. The auth target
//! finalizes first; only when it succeeds does the identity target finalize.
//! Both steps run through the deferred scheduler, under the same
//! reentrancy-safe scheduling as ordinary requests. Failures are logged and
//! recorded but never block progression to exit. Requests still pending when
//! finalize fires are abandoned; their completion drop guards answer the
//! callers with a fatal reply.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{error, info};

use warden_providers::TargetKind;

use crate::bootstrap::{EXIT_OK, EXIT_STARTUP};
use crate::context::BackendContext;
use crate::deferred::Scheduler;

/// Tracing target for shutdown progress.
const SHUTDOWN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shutdown");

/// Phases of the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Normal operation.
    Running,
    /// Auth finalize scheduled or in progress.
    FinalizingAuth,
    /// Identity finalize scheduled or in progress.
    FinalizingIdentity,
    /// Sequence finished; the process exits once the queue drains.
    Exiting,
}

/// Drives the ordered finalize sequence.
#[derive(Debug)]
pub struct ShutdownSequencer {
    phase: ShutdownPhase,
    failed: bool,
}

impl Default for ShutdownSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSequencer {
    /// Creates a sequencer in the running phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: ShutdownPhase::Running,
            failed: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        self.phase
    }

    /// Whether the sequence has run to completion.
    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.phase == ShutdownPhase::Exiting
    }

    /// Process exit code: zero only when every finalize step succeeded.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.failed {
            EXIT_STARTUP
        } else {
            EXIT_OK
        }
    }

    /// Starts the sequence. Repeated calls while already shutting down are
    /// no-ops.
    pub fn begin(sequencer: &Rc<RefCell<Self>>, scheduler: &Scheduler<BackendContext>) {
        {
            let mut state = sequencer.borrow_mut();
            if state.phase != ShutdownPhase::Running {
                return;
            }
            info!(target: SHUTDOWN_TARGET, "starting shutdown sequence");
            state.phase = ShutdownPhase::FinalizingAuth;
        }
        Self::schedule_finalize(sequencer, scheduler, TargetKind::Auth);
    }

    fn schedule_finalize(
        sequencer: &Rc<RefCell<Self>>,
        scheduler: &Scheduler<BackendContext>,
        kind: TargetKind,
    ) {
        let state = Rc::clone(sequencer);
        let chain = scheduler.clone();
        let outcome = scheduler.schedule(move |context: &mut BackendContext| {
            Self::run_finalize(&state, &chain, context, kind);
        });
        if let Err(schedule_error) = outcome {
            error!(
                target: SHUTDOWN_TARGET,
                %schedule_error,
                %kind,
                "could not schedule finalize step"
            );
            let mut state = sequencer.borrow_mut();
            state.failed = true;
            state.phase = ShutdownPhase::Exiting;
        }
    }

    fn run_finalize(
        sequencer: &Rc<RefCell<Self>>,
        scheduler: &Scheduler<BackendContext>,
        context: &mut BackendContext,
        kind: TargetKind,
    ) {
        let result = match context.registry().lookup(kind) {
            Some(target) => target.borrow_mut().finalize(),
            None => Ok(()),
        };

        match kind {
            TargetKind::Auth => match result {
                Ok(()) => {
                    sequencer.borrow_mut().phase = ShutdownPhase::FinalizingIdentity;
                    Self::schedule_finalize(sequencer, scheduler, TargetKind::Identity);
                }
                Err(finalize_error) => {
                    error!(target: SHUTDOWN_TARGET, %finalize_error, "auth finalize failed");
                    let mut state = sequencer.borrow_mut();
                    state.failed = true;
                    state.phase = ShutdownPhase::Exiting;
                }
            },
            TargetKind::Identity => {
                let mut state = sequencer.borrow_mut();
                if let Err(finalize_error) = result {
                    error!(target: SHUTDOWN_TARGET, %finalize_error, "identity finalize failed");
                    state.failed = true;
                }
                info!(target: SHUTDOWN_TARGET, "shutdown sequence complete");
                state.phase = ShutdownPhase::Exiting;
            }
            TargetKind::Access | TargetKind::Chpass => {}
        }
    }
}
