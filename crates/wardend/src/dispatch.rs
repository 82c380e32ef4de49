//! Inbound request dispatch.
//!
//! Validates and classifies the two request shapes (account-info and PAM),
//! synthesizes immediate replies for everything that must not reach a
//! backend, and schedules the rest onto the deferred queue for the target's
//! handler. Completions send the reply on the backend's own connection via
//! the consumed one-shot [`PendingReply`].

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use warden_bus::pam::{
    pack_pam_response, unpack_pam_request, PamCommand, PamResponse, PAM_SUCCESS, PAM_SYSTEM_ERR,
};
use warden_bus::{
    BusError, DpReply, MethodCall, MethodTable, OnlineReply, OnlineState, PendingReply,
    ServiceIdentity, AccountInfoParams, BROKER_INTERFACE, BROKER_PATH, METHOD_GET_ACCOUNT_INFO,
    METHOD_GET_ONLINE, METHOD_IDENTIFY, METHOD_PAM_HANDLER, METHOD_PING, METHOD_RELOAD,
    METHOD_RES_INIT, MONITOR_INTERFACE, MONITOR_PATH, PROTOCOL_VERSION,
};
use warden_providers::{
    AccountInfoRequest, AttrScope, Completion, LookupFilter, Request, RequestPayload, TargetKind,
    TargetOps,
};

use crate::context::BackendContext;

/// Tracing target for dispatch decisions.
const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Errno-equivalent minor code for validation failures.
const EINVAL: u32 = 22;

/// Method table served to the supervising monitor.
#[must_use]
pub fn monitor_table() -> MethodTable<BackendContext> {
    MethodTable::new(MONITOR_INTERFACE, MONITOR_PATH)
        .with_method(METHOD_PING, handle_ping)
        .with_method(METHOD_RELOAD, handle_reload)
        .with_method(METHOD_RES_INIT, handle_res_init)
}

/// Method table served to front-end responders.
#[must_use]
pub fn broker_table() -> MethodTable<BackendContext> {
    MethodTable::new(BROKER_INTERFACE, BROKER_PATH)
        .with_method(METHOD_PING, handle_ping)
        .with_method(METHOD_IDENTIFY, handle_identify)
        .with_method(METHOD_GET_ONLINE, handle_get_online)
        .with_method(METHOD_GET_ACCOUNT_INFO, handle_get_account_info)
        .with_method(METHOD_PAM_HANDLER, handle_pam_handler)
}

/// Answers a health check.
pub fn handle_ping(
    _context: &mut BackendContext,
    _call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    reply.send_return(serde_json::Value::Null)
}

/// Acknowledges a configuration reload request.
pub fn handle_reload(
    context: &mut BackendContext,
    _call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    info!(
        target: DISPATCH_TARGET,
        domain = %context.domain(),
        "configuration reload requested"
    );
    reply.send_return(serde_json::Value::Null)
}

/// Acknowledges a resolver re-initialisation request.
pub fn handle_res_init(
    context: &mut BackendContext,
    _call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    info!(
        target: DISPATCH_TARGET,
        domain = %context.domain(),
        "resolver re-initialisation requested"
    );
    reply.send_return(serde_json::Value::Null)
}

/// Accepts a peer's identity announcement.
pub fn handle_identify(
    _context: &mut BackendContext,
    call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    let identity: ServiceIdentity = match serde_json::from_value(call.body.clone()) {
        Ok(identity) => identity,
        Err(parse_error) => {
            return reply.send_error(format!("malformed identity announcement: {parse_error}"));
        }
    };
    if identity.version != PROTOCOL_VERSION {
        warn!(
            target: DISPATCH_TARGET,
            version = identity.version,
            "rejecting peer with unsupported protocol version"
        );
        return reply.send_error(format!(
            "unsupported protocol version {}",
            identity.version
        ));
    }
    info!(
        target: DISPATCH_TARGET,
        role = ?identity.role,
        service = %identity.service,
        "peer identified"
    );
    reply.send_return(serde_json::Value::Null)
}

/// Answers the online-status query, clearing stale offline state.
pub fn handle_get_online(
    context: &mut BackendContext,
    _call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    let state = if context.offline_mut().is_offline() {
        OnlineState::Offline
    } else {
        OnlineState::Online
    };
    let body = serde_json::to_value(OnlineReply::new(state))?;
    reply.send_return(body)
}

/// Validates an account-info query and schedules it on the identity target.
pub fn handle_get_account_info(
    context: &mut BackendContext,
    call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    let params: AccountInfoParams = match serde_json::from_value(call.body.clone()) {
        Ok(params) => params,
        Err(parse_error) => {
            return reply.send_error(format!("malformed account-info parameters: {parse_error}"));
        }
    };

    let Some(attrs) = AttrScope::parse(&params.attrs) else {
        debug!(target: DISPATCH_TARGET, attrs = %params.attrs, "invalid attribute selector");
        return send_validation_failure(
            reply,
            format!("invalid attribute selector '{}'", params.attrs),
        );
    };
    let Some(filter) = LookupFilter::parse(&params.filter) else {
        debug!(target: DISPATCH_TARGET, filter = %params.filter, "invalid lookup filter");
        return send_validation_failure(reply, format!("invalid filter '{}'", params.filter));
    };

    // Account lookups always route to the identity target, which is
    // mandatory at startup.
    let Some(target) = context.registry().lookup(TargetKind::Identity) else {
        return send_validation_failure(reply, "identity target unavailable");
    };
    if !context.scheduler().has_capacity() {
        return reply.send_error("deferred queue exhausted");
    }

    let request = Request::new(
        RequestPayload::AccountInfo(AccountInfoRequest {
            entry_type: params.entry_type,
            attrs,
            filter,
        }),
        account_info_completion(reply),
    );
    schedule_request(context, target, request);
    Ok(())
}

/// Unpacks a PAM operation, maps it to its target, and schedules it.
pub fn handle_pam_handler(
    context: &mut BackendContext,
    call: &MethodCall,
    reply: PendingReply,
) -> Result<(), BusError> {
    let mut pam = match unpack_pam_request(&call.body) {
        Ok(pam) => pam,
        Err(unpack_error) => {
            return reply.send_error(format!("malformed PAM request: {unpack_error}"));
        }
    };
    // The status starts at the system-error sentinel regardless of what the
    // wire carried; only a backend target may overwrite it.
    pam.pam_status = PAM_SYSTEM_ERR;

    let kind = match pam.command() {
        Some(PamCommand::Authenticate) => TargetKind::Auth,
        Some(PamCommand::AccountManagement) => TargetKind::Access,
        Some(PamCommand::ChangeAuthToken) => TargetKind::Chpass,
        _ => {
            // Unknown or session-scoped PAM operations succeed without
            // backend involvement.
            debug!(target: DISPATCH_TARGET, cmd = pam.cmd, "PAM command accepted as no-op");
            return send_pam_response(reply, PAM_SUCCESS, context.domain());
        }
    };

    let Some(target) = context.registry().lookup(kind) else {
        info!(
            target: DISPATCH_TARGET,
            %kind,
            user = %pam.user,
            "no backend registered for PAM target"
        );
        // The status is still at the sentinel set above.
        return send_pam_response(reply, pam.pam_status, context.domain());
    };
    if !context.scheduler().has_capacity() {
        return reply.send_error("deferred queue exhausted");
    }

    let request = Request::new(
        RequestPayload::Pam(pam),
        pam_completion(reply, context.domain().to_owned()),
    );
    schedule_request(context, target, request);
    Ok(())
}

fn account_info_completion(reply: PendingReply) -> Completion {
    Completion::new(move |_payload, dp_reply| match serde_json::to_value(&dp_reply) {
        Ok(body) => {
            if let Err(send_error) = reply.send_return(body) {
                warn!(target: DISPATCH_TARGET, %send_error, "failed to send account-info reply");
            }
        }
        Err(encode_error) => {
            error!(target: DISPATCH_TARGET, %encode_error, "failed to encode account-info reply");
        }
    })
}

fn pam_completion(reply: PendingReply, domain: String) -> Completion {
    Completion::new(move |payload, _dp_reply| {
        let pam_status = match payload {
            RequestPayload::Pam(pam) => pam.pam_status,
            RequestPayload::AccountInfo(_) => {
                error!(target: DISPATCH_TARGET, "PAM completion fired for non-PAM payload");
                warden_bus::pam::PAM_SYSTEM_ERR
            }
        };
        let response = PamResponse { pam_status, domain };
        match pack_pam_response(&response) {
            Ok(body) => {
                if let Err(send_error) = reply.send_return(body) {
                    warn!(target: DISPATCH_TARGET, %send_error, "failed to send PAM reply");
                }
            }
            Err(encode_error) => {
                error!(target: DISPATCH_TARGET, %encode_error, "failed to encode PAM reply");
            }
        }
    })
}

fn send_validation_failure(
    reply: PendingReply,
    message: impl Into<String>,
) -> Result<(), BusError> {
    let body = serde_json::to_value(DpReply::fatal(EINVAL, message))?;
    reply.send_return(body)
}

fn send_pam_response(
    reply: PendingReply,
    pam_status: u32,
    domain: &str,
) -> Result<(), BusError> {
    let body = pack_pam_response(&PamResponse {
        pam_status,
        domain: domain.to_owned(),
    })?;
    reply.send_return(body)
}

fn schedule_request(
    context: &mut BackendContext,
    target: Rc<RefCell<dyn TargetOps>>,
    request: Request,
) {
    let outcome = context
        .scheduler()
        .schedule(move |_context: &mut BackendContext| {
            target.borrow_mut().handle(request);
        });
    if let Err(schedule_error) = outcome {
        // Capacity was checked beforehand; if this still fails, the dropped
        // request's guard has already answered the caller.
        error!(target: DISPATCH_TARGET, %schedule_error, "failed to schedule request");
    }
}
