pub mod credentials;
pub mod gmail;
pub mod poller;
pub mod source;
