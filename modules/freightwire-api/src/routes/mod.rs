pub mod articles;
pub mod discovery;
pub mod keys;
pub mod sources;
pub mod subscriptions;
