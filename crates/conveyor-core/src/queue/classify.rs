//! Fatal-vs-transient failure classification.
//!
//! A nonzero exit is retried by default; only output matching one of the
//! known permanent-misconfiguration signatures below dead-letters the job
//! immediately, preventing endless busy-looping on unfixable tenant state.
//!
//! The phrase list is matched verbatim against downstream tool output and
//! is load-bearing for existing tenants. Candidate for replacement with
//! structured error codes once downstream emits them.

/// Output signatures of unrecoverable failures.
pub const FATAL_SIGNATURES: &[&str] = &[
    // OAuth refresh token revoked or expired
    "invalid_grant",
    // Credentials were never provisioned for the tenant
    "no credentials found for account",
    // Provider rejected the stored token
    "401 Unauthorized",
    "403 Forbidden: access_denied",
    // Target library/resource was deleted upstream
    "requested resource no longer exists",
    // Downstream tool invoked with arguments it does not understand
    "unrecognized arguments:",
];

/// Whether a failed attempt is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Ordinary failure; retried with backoff.
    Transient,
    /// Permanent misconfiguration; dead-letter immediately.
    Fatal,
}

impl FailureKind {
    pub fn retryable(self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

/// Classify a failed subprocess by scanning its captured output tails.
pub fn classify_output(stdout_tail: &str, stderr_tail: &str) -> FailureKind {
    for signature in FATAL_SIGNATURES {
        if stdout_tail.contains(signature) || stderr_tail.contains(signature) {
            return FailureKind::Fatal;
        }
    }
    FailureKind::Transient
}
