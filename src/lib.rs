pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod exception;
pub mod param;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use auth::{Authenticator, AuthorizationDetails, Credential};
pub use config::Config;
pub use dispatcher::{DispatchOutcome, Dispatcher, Handler};
pub use exception::Exception;
pub use request::{parse_content_range, RequestView};
pub use response::{Cookie, CorsPolicy, ResponseWriter};
pub use server::Server;
pub use transport::{MemoryRequest, MemoryTransport, Transport, TransportRequest};
