//! # Cloud
//!
//! Authentication and remote storage for off-site backup copies.
//!
//! - `credential` parses the credential file into a [`CloudCredential`]
//! - `auth` selects a [`CloudAuthStrategy`] and hands out [`CloudSession`]s
//! - `token` talks to the OAuth token endpoint
//! - `remote` is the storage seam; `drive` implements it for Google Drive

mod auth;
mod credential;
mod drive;
mod errors;
mod remote;
mod token;

pub use auth::{CloudAuthStrategy, CloudAuthenticator, CloudSession};
pub use credential::{CloudCredential, ConsentClient, OAuthToken, ServiceAccountKey};
pub use drive::DriveClient;
pub use errors::{CloudError, CloudResult};
pub use remote::{ensure_folder, RemoteObject, RemoteStore};
pub use token::{sign_assertion, GoogleTokenEndpoint, TokenEndpoint, DRIVE_SCOPES};
