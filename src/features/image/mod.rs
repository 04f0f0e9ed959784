mod remote;
mod renderer;

pub use remote::RemoteImageFetcher;
pub use renderer::{RenderError, RenderedImage, Renderer, get_global_font_db};
