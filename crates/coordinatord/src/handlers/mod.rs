pub mod admin;
pub mod key;
pub mod map;
pub mod oidc;
pub mod register;
pub mod routes;
