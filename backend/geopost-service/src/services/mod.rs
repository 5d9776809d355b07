/// Business logic layer
///
/// - Post service: ownership checks, validation, public projection
/// - Upload gateway: storage key generation and hand-off to object storage
pub mod posts;
pub mod uploads;

pub use posts::{PostService, PostSettings};
pub use uploads::{UploadGateway, UploadedFile};
