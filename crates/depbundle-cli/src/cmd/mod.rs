pub mod bundle;
pub mod completions;
pub mod list;
