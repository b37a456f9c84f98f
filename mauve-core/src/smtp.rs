//! # SMTP
//!
//! Sends mail through [`crate::Client`]. An [`SmtpRequest`] is one mail transaction (the
//! envelope and the rendered message); [`SmtpRequestBuilder`] assembles it and
//! [`SmtpTransport`] delivers it over a plain SMTP session.
//!
//! When some recipients are refused, the transaction is abandoned and the client's envelope
//! lists every refusal, one cause per recipient.
pub mod builder;
mod mailbox;
mod message;
mod transport;

pub use builder::{SmtpBuildError, SmtpRequestBuilder};
pub use mailbox::{AddressError, Mailbox};
pub use message::{Attachment, SmtpRequest};
pub use transport::{SmtpError, SmtpReceipt, SmtpReply, SmtpTransport};
