//! Core modules of the rewriting engine.

pub mod driver;
pub mod error;
pub mod location;
pub mod node;
pub mod pass;
pub mod pattern;
pub mod rule;
pub mod symtab;
pub mod testing;
pub mod token;

pub use driver::{Driver, DriverError, DriverOutput, FnSchema, PassMetrics, Schema, SchemaViolation};
pub use error::{NodeError, PassError};
pub use location::{Location, Source, SourceRef};
pub use node::Node;
pub use pass::{Direction, Pass, PassReport};
pub use pattern::{Match, NodeRange, Pattern};
pub use rule::{rule, Rewrite, Rule};
pub use token::{Token, TokenDef, TokenFlags};
