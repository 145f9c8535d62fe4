//! Per-client Google authorization
//!
//! Sessions live in a [`store::SessionStore`], move through the
//! [`machine::Authorizer`] and reach Google through a
//! [`provider::OAuthProvider`].

pub mod error;
pub mod machine;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;
pub mod utils;

pub use error::{AuthError, ExchangeError};
pub use machine::{AuthorizationRequest, Authorizer, CompletedAuthorization};
pub use session::{AuthState, ClientId, ClientSession, Nonce};
