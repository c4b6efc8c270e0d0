//! Declarative model components and the assembly engine
pub mod expr;
pub mod instance;
pub mod name;
pub mod registry;
