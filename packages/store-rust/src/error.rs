/// Errors raised by the in-memory store and the member registry.
///
/// They reach collection proxies as `anyhow::Error` through the record store
/// traits and surface as `CollectionError::Store` or inside
/// `CollectionError::Configuration`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record `{id}` must be a JSON object")]
    NotAnObject { id: String },
    #[error("in-memory store cannot evaluate SQL condition `{clause}`")]
    UnsupportedCondition { clause: String },
    #[error("no record store registered for member type `{member}`")]
    UnknownMember { member: String },
}
