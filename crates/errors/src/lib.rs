//! Shared error classification used across the schema-change engine.
//!
//! Mirrors the classify-then-propagate pattern used throughout: business
//! logic attaches an [`ErrorMetadata`] to an `anyhow::Error` via `.context(..)`
//! so that callers several layers up the stack (the DDL job loop) can
//! classify a failure without string matching.
use std::borrow::Cow;

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{msg}")]
pub struct ErrorMetadata {
    pub code: ErrorCode,
    /// short ScreamingCamelCase tag. Usable in tests for string matching.
    /// Eg DupKeyName
    pub short_msg: Cow<'static, str>,
    /// human readable, developer facing.
    pub msg: Cow<'static, str>,
}

#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The caller supplied a malformed or contradictory request. Cancels the
    /// job; not retryable without changing the request.
    BadRequest,
    /// The referenced object (column, index, table) does not exist.
    NotFound,
    /// A conflicting value already exists. Used for unique-index violations
    /// and name collisions.
    Conflict,
    /// The engine observed a state transition it cannot make sense of. This
    /// always indicates a bug, not a user error.
    Internal,
}

impl ErrorMetadata {
    pub fn bad_request(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn not_found(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::NotFound,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn conflict(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Conflict,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: ErrorCode::Internal,
            short_msg: INTERNAL_ERROR.into(),
            msg: msg.into(),
        }
    }

    pub fn is_bad_request(&self) -> bool {
        self.code == ErrorCode::BadRequest
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.code == ErrorCode::Conflict
    }

    pub fn is_internal(&self) -> bool {
        self.code == ErrorCode::Internal
    }

    /// Validation and name-collision errors are caused by the request, not
    /// by the engine, so the DDL job loop cancels the job outright instead of
    /// retrying.
    pub fn cancels_job(&self) -> bool {
        matches!(self.code, ErrorCode::BadRequest | ErrorCode::NotFound)
    }
}

pub const INTERNAL_ERROR: &str = "InternalError";

pub trait ErrorMetadataAnyhowExt {
    fn is_bad_request(&self) -> bool;
    fn is_not_found(&self) -> bool;
    fn is_conflict(&self) -> bool;
    fn is_internal(&self) -> bool;
    fn cancels_job(&self) -> bool;
    fn short_msg(&self) -> &str;
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    fn is_bad_request(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_bad_request)
    }

    fn is_not_found(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_not_found)
    }

    fn is_conflict(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_conflict)
    }

    fn is_internal(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::is_internal)
    }

    fn cancels_job(&self) -> bool {
        self.downcast_ref::<ErrorMetadata>()
            .is_some_and(ErrorMetadata::cancels_job)
    }

    fn short_msg(&self) -> &str {
        self.downcast_ref::<ErrorMetadata>()
            .map_or(INTERNAL_ERROR, |e| &e.short_msg)
    }
}

#[cfg(any(test, feature = "testing"))]
mod proptest_impls {
    use proptest::prelude::*;

    use super::{
        ErrorCode,
        ErrorMetadata,
    };

    impl Arbitrary for ErrorMetadata {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            any::<ErrorCode>()
                .prop_map(|code| match code {
                    ErrorCode::BadRequest => ErrorMetadata::bad_request("Bad", "request"),
                    ErrorCode::NotFound => ErrorMetadata::not_found("Not", "found"),
                    ErrorCode::Conflict => ErrorMetadata::conflict("Conflict", "conflict"),
                    ErrorCode::Internal => ErrorMetadata::internal("internal"),
                })
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::ErrorMetadata;

    proptest! {
        #![proptest_config(ProptestConfig { failure_persistence: None, ..ProptestConfig::default() })]

        #[test]
        fn cancels_job_matches_code(err in any::<ErrorMetadata>()) {
            let should_cancel = err.is_bad_request() || err.is_not_found();
            prop_assert_eq!(err.cancels_job(), should_cancel);
        }
    }
}
