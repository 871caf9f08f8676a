//! SOAP envelope builder.
//!
//! # Responsibilities
//! - Wrap payloads in SOAP 1.1 / 1.2 envelopes per webservice entry
//! - Sign requests and verify responses for services with a security block
//! - Unwrap response envelopes back to the business element
//!
//! # Data Flow
//! ```text
//! directory.rs (WebserviceConfig by id)
//!     → signing.rs (digests, security header)
//!     → envelope.rs (Envelope / Header / Body)
//!     → client.rs (send via remote executor, verify, unwrap)
//! ```

pub mod client;
pub mod directory;
pub mod envelope;
pub mod signing;

pub use client::{unwrap_response, unwrap_signed_response, SoapClient, SoapError};
pub use directory::{ConfiguredWebservices, WebserviceDirectory};
pub use envelope::{build_envelope, SoapVersion};
pub use signing::{DigestAlgorithm, SigningError};
