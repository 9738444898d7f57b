pub mod frame;

pub use frame::{Frame, FrameHeader, HEADER_LEN, MAX_PAYLOAD_LEN};
