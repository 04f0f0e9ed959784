mod binder;
mod context;
mod layout;
pub mod svg;

pub use binder::{BUNDLED_TEMPLATE, Document, Placeholder, Template, TemplateError};
pub use context::RenderContext;
