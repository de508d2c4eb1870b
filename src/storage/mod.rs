pub mod ids;
pub mod note;
pub mod parser;
pub mod store;
