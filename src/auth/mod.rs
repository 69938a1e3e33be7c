pub mod store;
pub use store::{AuthError, AuthStore, Credentials};
