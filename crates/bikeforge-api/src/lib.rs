pub mod error;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod server;
pub mod state;

pub use error::*;
pub use handlers::*;
pub use logging::init_tracing;
pub use routes::*;
pub use server::*;
pub use state::*;
