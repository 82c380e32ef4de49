//! In-flight backend requests and their one-shot completions.
//!
//! A [`Request`] owns its payload together with the completion that answers
//! the original caller. Completion consumes the request, so a request can be
//! answered at most once by construction. A request dropped without being
//! completed answers the caller with a fatal reply from its drop guard, so a
//! buggy or aborted target can never leave the caller waiting forever.

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString};
use tracing::warn;

use warden_bus::pam::PamRequest;
use warden_bus::DpReply;

/// Tracing target for request lifecycle events.
const REQUEST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::request");

/// Errno-equivalent minor code reported by the drop guard.
const DROPPED_MINOR: u32 = 5; // EIO

/// Attribute scopes accepted by account-information lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AttrScope {
    /// Core entry attributes only.
    Core,
    /// Membership attributes only.
    Membership,
    /// Everything the backend knows.
    All,
}

impl AttrScope {
    /// Parses an attribute selector, accepting only the exact scope names.
    #[must_use]
    pub fn parse(attrs: &str) -> Option<Self> {
        Self::from_str(attrs).ok()
    }
}

/// Validated lookup filter of an account-information request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFilter {
    /// Lookup by entry name.
    Name(String),
    /// Lookup by numeric identifier.
    IdNumber(String),
}

impl LookupFilter {
    /// Parses a filter expression, accepting the `name=` and `idnumber=`
    /// prefixes only.
    #[must_use]
    pub fn parse(filter: &str) -> Option<Self> {
        if let Some(value) = filter.strip_prefix("name=") {
            Some(Self::Name(value.to_owned()))
        } else {
            filter
                .strip_prefix("idnumber=")
                .map(|value| Self::IdNumber(value.to_owned()))
        }
    }
}

impl fmt::Display for LookupFilter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(value) => write!(formatter, "name={value}"),
            Self::IdNumber(value) => write!(formatter, "idnumber={value}"),
        }
    }
}

/// Validated parameters of an account-information request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfoRequest {
    /// Entry type selector, passed through to the backend module.
    pub entry_type: u32,
    /// Requested attribute scope.
    pub attrs: AttrScope,
    /// Lookup filter.
    pub filter: LookupFilter,
}

/// Payload of one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    /// An account-information lookup.
    AccountInfo(AccountInfoRequest),
    /// A PAM operation.
    Pam(PamRequest),
}

/// One-shot callback answering the original caller.
pub struct Completion {
    callback: Option<Box<dyn FnOnce(&RequestPayload, DpReply)>>,
}

impl Completion {
    /// Wraps a callback into a one-shot completion.
    #[must_use]
    pub fn new(callback: impl FnOnce(&RequestPayload, DpReply) + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    fn fire(&mut self, payload: &RequestPayload, reply: DpReply) {
        if let Some(callback) = self.callback.take() {
            callback(payload, reply);
        }
    }

    fn is_armed(&self) -> bool {
        self.callback.is_some()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Completion")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// An in-flight request owned by the target serving it.
#[derive(Debug)]
pub struct Request {
    payload: RequestPayload,
    completion: Completion,
}

impl Request {
    /// Pairs a payload with its completion.
    #[must_use]
    pub fn new(payload: RequestPayload, completion: Completion) -> Self {
        Self {
            payload,
            completion,
        }
    }

    /// The request payload.
    #[must_use]
    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    /// Mutable access to the payload, for targets that fill in results.
    pub fn payload_mut(&mut self) -> &mut RequestPayload {
        &mut self.payload
    }

    /// Answers the caller and consumes the request.
    pub fn complete(mut self, reply: DpReply) {
        self.completion.fire(&self.payload, reply);
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.completion.is_armed() {
            warn!(
                target: REQUEST_TARGET,
                payload = ?self.payload,
                "request dropped without completion, answering with a fatal reply"
            );
            self.completion.fire(
                &self.payload,
                DpReply::fatal(DROPPED_MINOR, "request dropped without completion"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;

    use warden_bus::DpErrorMajor;

    use super::*;

    fn account_info_payload() -> RequestPayload {
        RequestPayload::AccountInfo(AccountInfoRequest {
            entry_type: 1,
            attrs: AttrScope::Core,
            filter: LookupFilter::Name("alice".to_owned()),
        })
    }

    fn recording_completion(replies: &Rc<RefCell<Vec<DpReply>>>) -> Completion {
        let replies = Rc::clone(replies);
        Completion::new(move |_payload, reply| replies.borrow_mut().push(reply))
    }

    #[rstest]
    #[case("core", Some(AttrScope::Core))]
    #[case("membership", Some(AttrScope::Membership))]
    #[case("all", Some(AttrScope::All))]
    #[case("ALL", None)]
    #[case(" core", None)]
    #[case("everything", None)]
    fn attr_scope_accepts_exact_names_only(
        #[case] input: &str,
        #[case] expected: Option<AttrScope>,
    ) {
        assert_eq!(AttrScope::parse(input), expected);
    }

    #[rstest]
    #[case("name=alice", Some(LookupFilter::Name("alice".to_owned())))]
    #[case("idnumber=1000", Some(LookupFilter::IdNumber("1000".to_owned())))]
    #[case("name=", Some(LookupFilter::Name(String::new())))]
    #[case("uid=1000", None)]
    #[case("alice", None)]
    fn filter_accepts_known_prefixes_only(
        #[case] input: &str,
        #[case] expected: Option<LookupFilter>,
    ) {
        assert_eq!(LookupFilter::parse(input), expected);
    }

    #[test]
    fn completing_a_request_answers_exactly_once() {
        let replies = Rc::new(RefCell::new(Vec::new()));
        let request = Request::new(account_info_payload(), recording_completion(&replies));

        request.complete(DpReply::success());

        let replies = replies.borrow();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].error_major, DpErrorMajor::Ok.code());
    }

    #[test]
    fn dropping_an_uncompleted_request_answers_with_a_fatal_reply() {
        let replies = Rc::new(RefCell::new(Vec::new()));
        let request = Request::new(account_info_payload(), recording_completion(&replies));

        drop(request);

        let replies = replies.borrow();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].error_major, DpErrorMajor::Fatal.code());
        assert!(replies[0].error_message.contains("dropped"));
    }
}
