//! Domain records for the advice desk

mod request;
mod user;
mod view;

pub use request::{AdviceRequest, Expected, NewAdviceRequest, RequestStatus, REQUEST_COLLECTION};
pub use user::{UserRecord, USER_COLLECTION};
pub use view::{AssignedClient, HistoryItem, RequestView, NO_CATEGORY};
