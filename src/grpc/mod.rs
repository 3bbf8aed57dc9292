pub mod channel;

pub use channel::connect;
