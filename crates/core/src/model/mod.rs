pub mod lane;

pub use lane::{InFlight, Lane, LanePhase, LaneState, TicketId};
