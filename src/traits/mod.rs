pub mod codec;
pub mod manager;
pub mod record;

// Re-export commonly used types
pub use codec::{Codec, CodecResult};
pub use manager::TransactionManager;
pub use record::Record;
