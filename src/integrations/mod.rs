//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod http_client {
    pub use crate::http_client::*;
}

pub mod telemetry {
    pub use crate::telemetry::*;
}
