pub mod downloads;
pub mod llm_service;
pub mod storage;
pub mod uploader;

pub use llm_service::LlmService;
pub use storage::{BucketProbe, MemoryStorage, ObjectStorage, S3Storage};
pub use uploader::{BatchReport, StorageUploader, UploadFailure, UploadResult};
