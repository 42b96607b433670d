mod error;
#[cfg(feature = "http")]
mod http;
mod source;

pub use error::SourceError;
#[cfg(feature = "http")]
pub use http::{HttpChangeSource, DEFAULT_BASE_URL};
pub use source::{BaseBundle, ChangeEntry, ChangeSource, SecondaryBundle, SecondaryChange};
