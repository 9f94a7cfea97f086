pub mod jwt;

pub use jwt::JwtKeys;
