//! # Video: JPEG stream reassembly
//!
//! The drone streams MJPEG over UDP. Every datagram carries one fragment
//! of one image; fragments arrive unordered and some never arrive.
//!
//! | Module        | Purpose                                      |
//! |---------------|----------------------------------------------|
//! | `fragment`    | Datagram layout of a single fragment         |
//! | `reassembler` | Per-frame buffering, ordering, and emission  |

pub mod fragment;
pub mod reassembler;

pub use fragment::VideoFragment;
pub use reassembler::{FrameReassembler, VideoFrame};
