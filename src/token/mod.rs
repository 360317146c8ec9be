//! Access token subsystem: minting, validation and revocation.
//!
//! One codec signs and parses every access token in the system; one
//! validator runs the checks in a fixed order; one ledger answers "has this
//! token been recalled". Splitting the concerns this way keeps each check
//! explicit and independently testable:
//!
//! ```text
//! Bearer token arrives
//!   -> TokenCodec::decode        (structure + signature, or Malformed)
//!   -> tokenType check           (wrong purpose -> Unauthorized)
//!   -> expiry check              (past exp -> Expired)
//!   -> RevocationLedger lookup   (blacklisted -> Revoked)
//! ```

pub mod claims;
pub mod codec;
pub mod revocation;
pub mod validator;

pub use claims::{AccessClaims, TokenType};
pub use codec::TokenCodec;
pub use revocation::{InMemoryRevocationLedger, RevocationLedger};
pub use validator::TokenValidator;
