use stocktrail_engine::Session;
use stocktrail_storage::SqliteMirror;

use crate::server::ServerHandle;

/// Local sandbox session backed by an in-memory mirror. Seeds the demo set.
pub fn local_session() -> Result<Session, Box<dyn std::error::Error>> {
    crate::init_tracing();
    Ok(Session::local(SqliteMirror::open_in_memory()?)?)
}

/// Local session over an on-disk mirror, for persistence/reload tests.
pub fn local_session_at(path: &str) -> Result<Session, Box<dyn std::error::Error>> {
    crate::init_tracing();
    Ok(Session::local(SqliteMirror::open(path)?)?)
}

/// Connected session against a fresh in-memory server. Returns the session
/// together with a handle for inspecting and steering the server.
pub fn connected_session() -> Result<(Session, ServerHandle), Box<dyn std::error::Error>> {
    connected_session_with(ServerHandle::new())
}

pub fn connected_session_with(
    server: ServerHandle,
) -> Result<(Session, ServerHandle), Box<dyn std::error::Error>> {
    crate::init_tracing();
    let session = Session::connected(SqliteMirror::open_in_memory()?, Box::new(server.clone()))?;
    Ok((session, server))
}
