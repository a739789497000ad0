mod refresh;
mod store;

pub use store::{CredentialStore, SqliteCredentialStore};
