pub mod dispatcher;
pub mod error;
pub mod intent;
pub mod response;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ErrorKind;
pub use response::Envelope;
pub use runtime::{render_artifact, TaskAgent};
