//! Error taxonomy for collection proxies.
//!
//! Every variant is surfaced directly to the caller. Nothing here is retried
//! internally: the proxy is a synchronous front for a record store, and
//! failures of the store itself pass through [`CollectionError::Store`]
//! unmodified.

/// Errors returned by collection proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// A scope-mutating operation was invoked after the rows were materialized.
    ///
    /// Recoverable by deriving a fresh proxy (`order_by`, `include`, `page`, ...)
    /// instead of mutating the loaded one.
    #[error("cannot modify a collection that has already been loaded")]
    AlreadyLoaded,

    /// The member type of a collection type could not be resolved.
    #[error(
        "cannot resolve member type `{identifier}` (expected convention: {convention}): {source} \
         - declare the member type explicitly with `model(\"Name\")`"
    )]
    Configuration {
        /// The naming convention that was attempted.
        convention: String,
        /// The identifier that failed to resolve.
        identifier: String,
        /// Underlying lookup failure.
        #[source]
        source: anyhow::Error,
    },

    /// The operation is supported neither by the proxy nor by its row sequence.
    #[error("undefined operation `{operation}` for {sequence}")]
    UnsupportedOperation {
        /// Name of the requested operation.
        operation: String,
        /// Type name of the underlying row sequence.
        sequence: &'static str,
    },

    /// A supported operation was sent with arguments it cannot use.
    #[error("invalid arguments for `{operation}`: {message}")]
    InvalidArgument {
        /// Name of the requested operation.
        operation: &'static str,
        /// What was wrong with the arguments.
        message: String,
    },

    /// A SQL condition fragment was constructed with the wrong number of binds.
    #[error("condition `{clause}` expects {expected} bind values, got {given}")]
    InvalidCondition {
        /// The offending clause template.
        clause: String,
        /// Number of `?` placeholders in the clause.
        expected: usize,
        /// Number of bind values supplied.
        given: usize,
    },

    /// The collection could not be encoded into an external representation.
    #[error("failed to encode collection as {format}: {message}")]
    Encode {
        /// Target format (`"json"`, `"msgpack"`).
        format: &'static str,
        /// Encoder error message.
        message: String,
    },

    /// Failure reported by the record store collaborator, passed through as-is.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = CollectionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_convention_and_identifier() {
        let err = CollectionError::Configuration {
            convention: "<Member>Collection".to_string(),
            identifier: "BeerList".to_string(),
            source: anyhow::anyhow!("no member named `BeerList`"),
        };
        let msg = err.to_string();
        assert!(msg.contains("<Member>Collection"));
        assert!(msg.contains("BeerList"));
        assert!(msg.contains("no member named"));
        assert!(msg.contains("model(\"Name\")"));
    }

    #[test]
    fn unsupported_operation_names_operation_and_sequence() {
        let err = CollectionError::UnsupportedOperation {
            operation: "transmogrify".to_string(),
            sequence: "alloc::vec::Vec<u32>",
        };
        assert_eq!(
            err.to_string(),
            "undefined operation `transmogrify` for alloc::vec::Vec<u32>"
        );
    }

    #[test]
    fn store_errors_pass_through_unmodified() {
        let err: CollectionError = anyhow::anyhow!("connection refused").into();
        assert_eq!(err.to_string(), "connection refused");
    }
}
