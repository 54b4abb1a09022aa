//! Authentication for gateway connections.
//!
//! Only private key authentication is supported; see [`KeyAuth`].

mod key;

pub use key::KeyAuth;
