pub mod crypto;
pub mod error;
pub mod link;
pub mod message;
pub mod session;

pub use crypto::{GroupParams, group};
pub use error::{SmpError, SmpResult};
pub use link::Link;
pub use message::{SmpMessage, WireMessage};
pub use session::{Session, SessionContext, SmpState, Step};
