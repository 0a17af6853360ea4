pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod policy;

pub use dispatcher::{Delivery, DispatchOutcome, NotificationDispatcher, NotificationRequest};
pub use error::PushError;
pub use gateway::{ExpoPushGateway, PushGateway, PushMessage, PushTicket};
pub use policy::{NotificationPolicy, Presentation};
