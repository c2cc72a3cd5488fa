//! Synchronization with the remote server.
//!
//! Records are sent one at a time. The server answers a submission with the
//! ids it assigned; the manager copies them back into the stored record
//! together with `synced_on`. See [`protocol`] for the wire format.

mod error;
pub mod protocol;
mod remote;

pub use error::SyncError;
pub use protocol::{ChildReceipt, Deletion, Receipt, Submission};
pub use remote::{Credentials, HttpRemote, Remote};
