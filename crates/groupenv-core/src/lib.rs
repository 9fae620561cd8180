pub mod config;
pub mod layout;
pub mod manifest_info;
pub mod observability;

pub use layout::{GroupLayout, LayoutError};
