pub mod errors;
pub mod messaging;
pub mod timestamp;
pub mod user;

pub use errors::ErrorResponse;
pub use messaging::{
    CreateThreadRequest, Delivery, Doctor, Message, PageQuery, SendMessageRequest, Thread,
    ThreadQuery,
};
pub use timestamp::Timestamp;
pub use user::{LoginRequest, ParticipantRole, SessionUser};
