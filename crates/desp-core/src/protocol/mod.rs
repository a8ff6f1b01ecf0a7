//! Protocol module containing the datagram frame codec.

pub mod frame;

pub use frame::{
    decode_frame, encode_frame, is_pong_frame, strip_magic, Control, Frame, FrameError,
    CONTROL_FRAME_LEN, CONTROL_LEN, MAGIC,
};
