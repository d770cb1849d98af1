pub mod server;
pub mod session;

pub use server::{InMemoryServer, ServerHandle};
pub use session::{connected_session, connected_session_with, local_session, local_session_at};

/// Opt-in tracing output for test runs, driven by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
