//! Metadata resolution for the query compiler
//!
//! Translates the shard's catalog into planner column definitions. Missing
//! databases and relations are a soft "unresolvable" answer; every other
//! storage failure is fatal to the statement.

mod errors;
mod execution;
mod plan;

pub use errors::{ResolveError, ResolveResult};
pub use execution::{CompilerContext, Execution};
pub use plan::{ColDef, Cost, ObjectRef, PlanTableDef, PlanType, StatementKind};
