use thiserror::Error;

/// Failure reported by a remote collaborator (graph API, profile source).
/// The reason is opaque to the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Identity index {index} out of range (have {len})")]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

// Clone so a single in-flight lookup can hand its result to every waiter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Relationship query failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Relationship query returned {got} answers for {expected} lookups")]
    MalformedResponse { expected: usize, got: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("Follow mutation failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Could not resolve current relationship: {0}")]
    Unresolved(#[from] ResolveError),

    #[error("A profile cannot follow itself")]
    SelfFollow,

    #[error("No active identity")]
    NotSignedIn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = IndexError { index: 3, len: 2 };
        assert_eq!(err.to_string(), "Identity index 3 out of range (have 2)");

        let err: MutationError = ResolveError::MalformedResponse {
            expected: 2,
            got: 1,
        }
        .into();
        assert!(err.to_string().contains("2 lookups"));
    }
}
