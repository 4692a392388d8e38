//! Live frame handling: decoding camera payloads and holding the latest frame.
//!
//! The camera pipeline pushes [`RawFrame`]s into a [`FrameFeed`], which decodes
//! them off the caller's thread and publishes the result to a [`FrameStore`].
//! The store only ever holds one frame; a newer frame replaces the old one.

pub mod decode;
pub mod feed;
pub mod store;

pub use decode::{decode_frame, RawFrame};
pub use feed::{FrameFeed, FrameSink};
pub use store::{Frame, FrameStore};
