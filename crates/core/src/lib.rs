pub mod error;
pub mod history;
pub mod ids;
pub mod mode;
pub mod product;

pub use error::CoreError;
pub use history::{
    BatchGroup, ChangeDetails, ChangeRecord, ChangedField, EntityType, KnownDetails,
    PaginatedBatchGroups, ProductBatchSummary, group_records, total_pages,
};
pub use ids::*;
pub use mode::OperatingMode;
pub use product::{Lot, LotPayload, Product, Unit, derive_quantity};
