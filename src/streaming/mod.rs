//! Outbound streaming toward the render server
//!
//! Three independent producers share the live session: the pose streamer on
//! the input channel, the status reporter on the status channel, and the
//! stats collector over signaling.

pub mod pose;
pub mod stats;
pub mod status;
