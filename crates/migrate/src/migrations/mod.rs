//! Migration System
//!
//! Migration directory loading, ledger row types and the resolver that
//! marks failed migrations as applied or rolled back.

pub mod definitions;
pub mod directory;
pub mod resolver;

pub use definitions::*;
pub use directory::*;
pub use resolver::*;
