//! Authentication of API callers.
//!
//! Users sign in with the external identity provider, which issues short-lived session JWTs.
//! Clients send them as `Authorization: Bearer <token>`; the service verifies the signature,
//! expiry, issuer and authorized party locally and takes the `sub` claim as the user id.
//!
//! - [`current_user`]: Extractor resolving the authenticated caller in handlers
//! - [`token`]: Session token verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use promogen::api::models::users::CurrentUser;
//!
//! async fn protected_handler(current_user: CurrentUser) -> String {
//!     format!("Hello, {}!", current_user.id)
//! }
//! ```

pub mod current_user;
pub mod token;
