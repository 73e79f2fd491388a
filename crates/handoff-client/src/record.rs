//! Records submitted to a producer session, their acknowledgment metadata,
//! and the serializers that turn typed keys and values into bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A record to be sent within a transaction.
///
/// ## Partition Selection
///
/// - `partition` set: the record goes to that partition (validated against
///   topic metadata)
/// - otherwise, with a key: SipHash of the key modulo partition count
/// - otherwise: round-robin across partitions
///
/// ## Example
///
/// ```ignore
/// let record = ProducerRecord::new("orders", "order data")
///     .with_key("user123")
///     .with_timestamp(1_700_000_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<Bytes>,
    pub value: Bytes,
    /// Milliseconds since the Unix epoch. Defaults to the send time.
    pub timestamp: Option<i64>,
}

impl ProducerRecord {
    pub fn new(topic: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key: None,
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build a record from typed key and value using the given serializers.
    pub fn serialize_with<K, V, KS, VS>(
        topic: impl Into<String>,
        key: Option<&K>,
        value: &V,
        key_serializer: &KS,
        value_serializer: &VS,
    ) -> Self
    where
        K: ?Sized,
        V: ?Sized,
        KS: RecordSerializer<K>,
        VS: RecordSerializer<V>,
    {
        let topic = topic.into();
        let key = key.map(|k| key_serializer.serialize(&topic, k));
        let value = value_serializer.serialize(&topic, value);
        Self {
            topic,
            partition: None,
            key,
            value,
            timestamp: None,
        }
    }
}

/// Where an acknowledged record landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: i32,
    pub offset: u64,
    pub timestamp: i64,
}

/// Converts a typed key or value into record bytes.
pub trait RecordSerializer<T: ?Sized>: Send + Sync {
    fn serialize(&self, topic: &str, data: &T) -> Bytes;
}

/// UTF-8 encoding of string keys and values.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl RecordSerializer<str> for StringSerializer {
    fn serialize(&self, _topic: &str, data: &str) -> Bytes {
        Bytes::copy_from_slice(data.as_bytes())
    }
}

impl RecordSerializer<String> for StringSerializer {
    fn serialize(&self, _topic: &str, data: &String) -> Bytes {
        Bytes::copy_from_slice(data.as_bytes())
    }
}

/// Pass-through for raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl RecordSerializer<[u8]> for BytesSerializer {
    fn serialize(&self, _topic: &str, data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(data)
    }
}

impl RecordSerializer<Bytes> for BytesSerializer {
    fn serialize(&self, _topic: &str, data: &Bytes) -> Bytes {
        data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let record = ProducerRecord::new("orders", "payload")
            .with_key("k1")
            .with_partition(2)
            .with_timestamp(42);

        assert_eq!(record.topic, "orders");
        assert_eq!(record.key, Some(Bytes::from("k1")));
        assert_eq!(record.value, Bytes::from("payload"));
        assert_eq!(record.partition, Some(2));
        assert_eq!(record.timestamp, Some(42));
    }

    #[test]
    fn test_serialize_with_strings() {
        let record = ProducerRecord::serialize_with(
            "T",
            Some("42"),
            "42",
            &StringSerializer,
            &StringSerializer,
        );
        assert_eq!(record.key, Some(Bytes::from("42")));
        assert_eq!(record.value, Bytes::from("42"));
        assert_eq!(record.partition, None);
    }

    #[test]
    fn test_serialize_with_mixed() {
        let payload: &[u8] = &[0xde, 0xad, 0xbe, 0xef];
        let record = ProducerRecord::serialize_with::<str, [u8], _, _>(
            "blobs",
            None,
            payload,
            &StringSerializer,
            &BytesSerializer,
        );
        assert!(record.key.is_none());
        assert_eq!(record.value.as_ref(), payload);
    }
}
