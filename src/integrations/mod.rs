//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod crm_client {
    pub use crate::crm_client::*;
}
