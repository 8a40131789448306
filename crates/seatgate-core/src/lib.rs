pub mod config;
pub mod logging;

pub mod admission;
pub mod cache;
pub mod error;
pub mod lock;
pub mod notify;
pub mod retry;
pub mod serializer;
pub mod service;
pub mod store;
pub mod types;
pub mod waitlist;

pub use admission::{AdmissionController, AdmissionParts};
pub use error::AdmissionError;
pub use service::ReservationService;
pub use types::{Admission, Availability, ItemId, RequesterId, Reservation, ReservationId};
