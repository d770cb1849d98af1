pub mod demo;
pub mod error;
pub mod history;
pub mod remote;
pub mod session;

pub use error::EngineError;
pub use history::HistoryLog;
pub use remote::{
    NewProduct, ProductBatchContextPayload, ProductPatch, RemoteApi, RemoteError,
};
pub use session::{ProductDetailsUpdate, Session};
