//! Domain layer for the Vigil workflow executor.
//!
//! Contains the data model (`models`), the capability contracts the executor
//! reaches external collaborators through (`ports`), and the error taxonomy
//! (`error`). Nothing in this module performs I/O.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{VigilError, VigilResult};
