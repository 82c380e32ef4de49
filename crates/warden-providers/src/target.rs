//! Backend target kinds and the operations they expose.
//!
//! A domain backend is assembled from up to four targets. Identity is
//! mandatory; the authentication-related targets are optional and fall back
//! to built-in behaviour when unconfigured.

use strum::{Display, EnumIter, EnumString};

use crate::error::ProviderError;
use crate::request::Request;

/// The four request categories a backend can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum TargetKind {
    /// User and group lookups. Mandatory for every domain.
    Identity,
    /// Credential verification.
    Auth,
    /// Account access control.
    Access,
    /// Password changes.
    Chpass,
}

impl TargetKind {
    /// Domain configuration option naming the module for this target.
    #[must_use]
    pub fn config_option(self) -> &'static str {
        match self {
            Self::Identity => "provider",
            Self::Auth => "auth-module",
            Self::Access => "access-module",
            Self::Chpass => "chpass-module",
        }
    }

    /// Whether a domain cannot start without this target.
    #[must_use]
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::Identity)
    }
}

/// Result of an explicit connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineProbe {
    /// The remote service answered.
    Reachable,
    /// The remote service could not be reached.
    Unreachable,
}

/// Operations one initialized target serves.
///
/// `handle` owns the request outright; the target completes it exactly once
/// (or lets the completion guard fire on drop). Targets that talk to remote
/// services may additionally support an explicit connectivity probe.
pub trait TargetOps {
    /// Serves one in-flight request.
    fn handle(&mut self, request: Request);

    /// Probes the remote service, when the target supports probing.
    fn check_online(&mut self) -> Option<OnlineProbe> {
        None
    }

    /// Releases target resources during shutdown.
    fn finalize(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case(TargetKind::Identity, "provider", true)]
    #[case(TargetKind::Auth, "auth-module", false)]
    #[case(TargetKind::Access, "access-module", false)]
    #[case(TargetKind::Chpass, "chpass-module", false)]
    fn config_options_and_mandatory_flags(
        #[case] kind: TargetKind,
        #[case] option: &str,
        #[case] mandatory: bool,
    ) {
        assert_eq!(kind.config_option(), option);
        assert_eq!(kind.is_mandatory(), mandatory);
    }

    #[test]
    fn kind_names_round_trip_in_lowercase() {
        for kind in TargetKind::iter() {
            let name = kind.to_string();
            assert_eq!(name, name.to_lowercase());
            assert_eq!(TargetKind::from_str(&name).ok(), Some(kind));
        }
    }
}
