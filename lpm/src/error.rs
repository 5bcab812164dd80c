use std::fmt;

/// Errors surfaced by table mutation. Lookups never fail; a miss returns the
/// invalid sentinel instead. Mutation errors leave the table unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A malformed argument: prefix length beyond the family maximum, a
    /// next-hop outside the 30-bit space, an address of the wrong family for
    /// the table, or mismatched batch buffers.
    InvalidArgument(String),

    /// An arena could not grow.
    ResourceExhausted(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => {
                write!(f, "invalid argument: {}", msg)
            }
            Self::ResourceExhausted(what) => {
                write!(f, "resource exhausted: {}", what)
            }
        }
    }
}

impl std::error::Error for Error {}
