pub mod error;
pub mod transport;
pub mod types;

pub use error::{BrokerError, BrokerResult, ErrorCode};
pub use transport::Transport;
pub use types::{
    IsolationLevel, PartitionInfo, ProduceRecord, ProducerIdentity, TopicPartition,
    TransactionResult,
};
