#![cfg_attr(not(test), forbid(unsafe_code))]

//! Client-side messaging core for the CarePortal patient/doctor portal.
//!
//! The crate turns the portal's REST messaging endpoints into a small state
//! engine:
//!
//! * [`gateway`] talks HTTP and attaches the bearer token.
//! * [`normalize`] maps the backend's assorted payload shapes onto
//!   [`shared::models::Thread`] and [`shared::models::Message`].
//! * [`store`] owns the thread list, the active thread, and its message buffer.
//! * [`poller`] keeps that state fresh on a fixed interval.
//! * [`composer`] sends messages with an optimistic local append.

pub mod composer;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod poller;
pub mod session;
pub mod store;

pub use composer::{Composer, SendOutcome, SendRejection};
pub use error::ClientError;
pub use gateway::{GatewayError, MessagingGateway, PortalClient};
pub use poller::{PollConfig, PollEvent, PollHandle, PollingLoop, TickOutcome, Visibility};
pub use session::{SessionError, SessionIdentity, StaticSession, StoredSession, session_path};
pub use store::{ConversationState, ConversationStore, ErrorBanner, PaneError, PollReport};
