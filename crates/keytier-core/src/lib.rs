pub mod config;
pub mod error;
pub mod types;

pub use error::{DecodeError, KeytierError, KeytierResult};
pub use types::{ExportBundle, KeySelection, Tier, WrappedKeyRecord};
