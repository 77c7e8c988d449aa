pub mod events;
pub mod observer;
pub mod orchestrator;
pub mod progress;
pub mod selection;
pub mod transport;
pub mod validator;
