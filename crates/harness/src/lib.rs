pub mod backend;
pub mod fixture;

pub use backend::{FakeBackend, Failure, Gate};
pub use fixture::{TestConsole, init_tracing, png};
