pub mod aggregate;
pub mod charts;
pub mod entities;
pub mod resolver;
