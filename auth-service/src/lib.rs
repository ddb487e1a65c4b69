/// Auth Service Library
///
/// Credential lifecycle core: issuance, validation and revocation of
/// short-lived access tokens and long-lived refresh tokens.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Subject directory (Postgres)
/// - `error`: Error types
/// - `revocation`: Token revocation store (Redis)
/// - `service`: Credential service (issue / validate / logout / refresh)
/// - `token`: Claims and signed-token codec
pub mod config;
pub mod db;
pub mod error;
pub mod revocation;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use error::{AuthError, Result};
pub use service::{CredentialService, TokenPair};
pub use token::{Claims, TokenCodec, TokenKind};
