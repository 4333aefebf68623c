//! Next-word prediction core shared by the `next-word`, `import` and
//! `device_check` binaries.

pub mod app;
pub mod cli;
pub mod error;
pub mod llm;
