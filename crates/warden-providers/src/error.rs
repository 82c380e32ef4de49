//! Errors raised while loading and initializing backend modules.

use thiserror::Error;

use crate::target::TargetKind;

/// Failures surfaced by module loading and target initialization.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The domain configuration names no module for the target.
    #[error("no module configured for {kind} target")]
    NotConfigured {
        /// Target the configuration left empty.
        kind: TargetKind,
    },

    /// The configured module name is absent from the catalog.
    #[error("backend module '{module}' is not available")]
    ModuleNotFound {
        /// Configured module name.
        module: String,
    },

    /// The module refused to initialize the requested target.
    #[error("module '{module}' failed to initialize {kind} target: {message}")]
    InitFailed {
        /// Module that failed.
        module: String,
        /// Target being initialized.
        kind: TargetKind,
        /// Module-supplied failure detail.
        message: String,
    },

    /// The module does not implement the requested target at all.
    #[error("module '{module}' does not provide a {kind} target")]
    UnsupportedTarget {
        /// Module that was asked.
        module: String,
        /// Target the module lacks.
        kind: TargetKind,
    },

    /// The target failed to release its resources during shutdown.
    #[error("{kind} target failed to finalize: {message}")]
    Finalize {
        /// Target being finalized.
        kind: TargetKind,
        /// Failure detail.
        message: String,
    },
}

impl ProviderError {
    /// Convenience constructor for [`ProviderError::NotConfigured`].
    #[must_use]
    pub fn not_configured(kind: TargetKind) -> Self {
        Self::NotConfigured { kind }
    }

    /// Convenience constructor for [`ProviderError::ModuleNotFound`].
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module: module.into(),
        }
    }

    /// Convenience constructor for [`ProviderError::InitFailed`].
    pub fn init_failed(
        module: impl Into<String>,
        kind: TargetKind,
        message: impl Into<String>,
    ) -> Self {
        Self::InitFailed {
            module: module.into(),
            kind,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`ProviderError::UnsupportedTarget`].
    pub fn unsupported_target(module: impl Into<String>, kind: TargetKind) -> Self {
        Self::UnsupportedTarget {
            module: module.into(),
            kind,
        }
    }

    /// Convenience constructor for [`ProviderError::Finalize`].
    pub fn finalize(kind: TargetKind, message: impl Into<String>) -> Self {
        Self::Finalize {
            kind,
            message: message.into(),
        }
    }
}
