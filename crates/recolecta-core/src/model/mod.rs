//! Domain model for pickup requests.

pub mod request;

pub use request::{
    Assignee, ClientContact, InvalidTransition, Location, ParseStateError, PickupRequest,
    RequestState, Schedule,
};
