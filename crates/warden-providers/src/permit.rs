//! Built-in always-permit access target.
//!
//! Domains that configure no access-control module fall back to this target:
//! every account-management check succeeds. Falling open here is intentional;
//! access control is opt-in per domain.

use tracing::debug;

use warden_bus::pam::PAM_SUCCESS;
use warden_bus::DpReply;

use crate::request::{Request, RequestPayload};
use crate::target::TargetOps;

/// Tracing target for the permit fallback.
const PERMIT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::permit");

/// Access target granting every request.
#[derive(Debug, Default)]
pub struct PermitAccess;

impl TargetOps for PermitAccess {
    fn handle(&mut self, mut request: Request) {
        if let RequestPayload::Pam(pam) = request.payload_mut() {
            debug!(
                target: PERMIT_TARGET,
                user = %pam.user,
                "access check permitted by fallback"
            );
            pam.pam_status = PAM_SUCCESS;
        }
        request.complete(DpReply::success());
    }
}
