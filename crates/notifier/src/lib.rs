//! Outbound delivery for new-mail notifications.
//!
//! - [`Notifier`]: the send capability the queue drains into
//! - [`DeliveryQueue`]: FIFO buffer with a single-flight drain task, fixed
//!   pacing between sends and exponential backoff on rate limits
//! - [`TwilioNotifier`] / [`TwilioLookup`]: WhatsApp delivery and phone number
//!   verification over the Twilio REST APIs

pub mod lookup;
pub mod notifier;
pub mod queue;
pub mod twilio;

pub use lookup::{LookupError, PhoneVerifier, TwilioLookup};
pub use notifier::{Notifier, SendError};
pub use queue::{DeliveryQueue, QueueConfig};
pub use twilio::{TwilioCredentials, TwilioNotifier};
