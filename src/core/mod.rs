//! Pipeline stages, the approval queue and the types they share.

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod queue {
    pub use crate::queue::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
