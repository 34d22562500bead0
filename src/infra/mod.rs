pub mod http_client;
pub mod page_renderer;

pub use http_client::ReqwestHttp;
pub use page_renderer::RenderServiceClient;
