//! Duplex session orchestration

pub mod controller;
pub mod diagnostics;
pub mod receiver;
pub mod sender;
pub mod signal;
pub mod worker;

pub use controller::{SessionController, SessionState, SessionStatus, SessionTicket};
pub use diagnostics::{SessionDiagnostics, SessionStats};
pub use signal::CancellationSignal;
pub use worker::SessionPipes;
