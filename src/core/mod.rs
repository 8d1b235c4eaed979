//! Core engine: schema model, SQL parsing, relationship inference,
//! reconciliation, emission, and validation.

mod export;
mod inference;
mod reconcile;
mod schema;
mod sql_parser;
mod validation;

pub use export::*;
pub use inference::*;
pub use reconcile::*;
pub use schema::*;
pub use sql_parser::*;
pub use validation::*;
