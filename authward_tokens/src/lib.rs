//! Building blocks for attaching service credentials to outbound requests
//!
//! This crate holds the parts of authenticated request handling that do not
//! depend on how requests are sent:
//!
//! * the shapes of the _client credentials_ and _delegation_ grants, and how
//!   an authority's answer to them is read ([`sources::oauth2`]);
//! * a token cache that keeps each issued token for exactly as long as its
//!   claims say it lives ([`sources::cache`]);
//! * a replaceable key/value [store] shared by the token and response caches;
//! * the exponential [backoff] policy and per-call retry budget.
//!
//! Secrets are wrapped in types that refuse to print themselves in full:
//!
//! ```
//! use authward_tokens::{ClientSecret, RefreshToken};
//!
//! let secret = ClientSecret::from_static("super-secret");
//! assert_eq!(format!("{:?}", secret), "***CLIENT SECRET***");
//!
//! let refresh = RefreshToken::from_static("abcdefghij");
//! assert_eq!(format!("{:#?}", refresh), "\"abcd…\"");
//! ```
//!
//! Tokens issued by the authority are cached by a key derived from the grant:
//!
//! ```
//! use authward_tokens::{sources::oauth2::{dto, CredentialsSource}, ClientId, ClientSecret};
//!
//! let grant = dto::ClientCredentialsWithAudience {
//!     credentials: dto::ClientCredentials {
//!         client_id: ClientId::from_static("my-client"),
//!         client_secret: ClientSecret::from_static("my-secret"),
//!     }
//!     .into(),
//!     audience: aliri::jwt::Audience::from_static("https://api.example.com/"),
//! };
//!
//! assert_eq!(grant.cache_key(), "https://api.example.com/-my-client");
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod backoff;
mod braids;
pub mod claims;
pub mod sources;
pub mod store;

pub use braids::*;
