//! Request middleware, applied in order:
//! session resolution → session fixation → CSRF.

pub mod guards;
pub mod session;

pub use guards::{csrf_middleware, session_fixation_middleware};
pub use session::{session_middleware, CurrentSession};
