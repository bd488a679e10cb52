/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The request was rejected before reaching the model, e.g. because
    /// the payload is malformed.
    InvalidRequest,
    /// Any other errors.
    Other,
}
