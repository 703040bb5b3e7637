//! Common test utilities and fixtures.

pub mod fixtures;
pub mod library;
pub mod storage;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use library::*;
#[allow(unused_imports)]
pub use storage::*;
