//! Edge router: a path-prefix reverse proxy in front of the backend services.

pub mod proxy;
pub mod routes;

pub use proxy::{gateway_router, Gateway, GatewayError};
pub use routes::{Route, RouteTable};
