//! Shared types of the change-event relay: the event model, broker records,
//! broker errors and the producer/consumer traits every broker backend
//! implements.

pub mod broker;
pub mod error;
pub mod event;
pub mod record;
pub mod util;

pub use broker::{BrokerConsumer, BrokerFuture, BrokerProducer};
pub use error::{BrokerError, ErrorKind};
pub use event::{ChangeEvent, EventSummary, EventType};
pub use record::{Delivery, RawRecord, SubscribeOptions};
pub use util::{iso_timestamp, now_iso};
