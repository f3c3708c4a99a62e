//! Host-side pieces of the `adtl` binary: logging, CSV adapters and row validation.

pub mod io;
pub mod logging;
pub mod validator;
