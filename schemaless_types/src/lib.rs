//! Vocabulary shared by the parser, the schema registry and the write path.

pub mod column;
pub mod time;
pub mod write;
