mod cache;
mod snapshot;
mod status;

pub use cache::{AnalysisCache, CachedAnalysis};
pub use snapshot::{
    BlobStore, JsonFileBlobStore, ProjectSnapshot, RestoredSession, SNAPSHOT_SCHEMA_VERSION,
};
pub use status::{Flow, FlowStates, FlowStatus};
