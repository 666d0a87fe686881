#![doc = include_str!("../README.md")]

pub mod consumer;
pub mod envelope;
pub mod message;
pub mod payload;
pub mod publish;
pub mod router;
pub mod source;

#[doc(inline)]
pub use consumer::{Consumer, ConsumerHook, DefaultConsumerHook};

#[doc(inline)]
pub use envelope::Envelope;

#[doc(inline)]
pub use message::{AttributeValue, RawMessage};

#[doc(inline)]
pub use payload::{DecodeError, Payload};

#[doc(inline)]
pub use publish::{Labels, Outbound, PublishError, Publisher, Sender};

#[doc(inline)]
pub use router::{DispatchOutcome, Handler, HandlerError, Router};

#[doc(inline)]
pub use source::{DeleteMessages, ReceiveMessages, ReceiveOptions};
