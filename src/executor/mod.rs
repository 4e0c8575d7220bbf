pub mod browser;
pub mod coordinator;
pub mod dispatcher;
pub mod environment;
pub mod keys;
pub mod validate;
