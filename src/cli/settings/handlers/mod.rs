//! Setting handler implementations.

pub mod boolean;
pub mod simple;

pub use simple::ProviderHandler;
