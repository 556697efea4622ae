//! The bus message model (§3 Message).

/// Immutable record delivered by the bus. `routing_key` is the asset identifier; `payload` is
/// opaque JSON the dispatcher never parses.
#[derive(Debug, Clone)]
pub struct Message {
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub offset: i64,
    pub topic: String,
    pub partition: i32,
}
