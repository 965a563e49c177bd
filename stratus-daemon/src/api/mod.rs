//! gRPC API of the daemon.

mod server;

pub use server::start_api_server;
