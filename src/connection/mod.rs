//! Connection to the dispatcher server
//!
//! This module handles:
//! - Registering with the server using the role token
//! - Relaying server messages to the console
//! - Forwarding console input under the role's command rules
//! - The answer countdown after a call prompt

mod session;

pub use session::{ClientSession, Exit};
