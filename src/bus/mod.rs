//! Message-bus adapter: the wire model and the consumer abstraction the Stream Dispatcher
//! drives from its dedicated thread.

pub mod consumer;
pub mod message;

pub use consumer::{BusConsumer, RdkafkaConsumer};
pub use message::Message;
