pub mod component;
pub mod config;
pub mod file_tree;
pub mod record;
pub mod target;
