// Domain-layer modules and shared errors/models
pub mod cep {
    pub use crate::cep::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod usecases {
    pub use crate::usecases::*;
}

pub mod errors {
    pub use crate::errors::*;
}
