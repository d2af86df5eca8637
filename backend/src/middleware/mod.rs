//! HTTP middleware.

pub mod trace;

pub use self::trace::Trace;
