pub mod handler;
mod identity;

pub use handler::{OgQuery, bind_document, create_og_router, generate_og_image};
pub use identity::RepositoryIdentity;
