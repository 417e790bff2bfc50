// Keypool — Credential Pool Module
//
// Owns the interchangeable upstream credentials and their health state.
// Records are created once at startup and only ever change state; the
// selection policy decides which one the next outbound call uses.

mod error;
mod models;
mod selection;
mod store;

pub use error::PoolError;
pub use models::{CredentialRecord, CredentialState, CredentialStatus, FailurePolicy};
pub(crate) use models::{deadline, truncate_detail};
pub use selection::{choose, choose_sticky, sticky_index};
pub use store::{Checkout, CredentialStore};
