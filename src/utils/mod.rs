//! Utilidades compartidas

pub mod errors;

pub use errors::DispatchError;
