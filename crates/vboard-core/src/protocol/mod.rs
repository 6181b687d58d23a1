//! Protocol module containing the frame model, the binary codec, and the
//! command table.

pub mod codec;
pub mod command;
pub mod frame;

pub use codec::{decode_body, decode_frame, decode_header, encode_frame, FrameError};
pub use command::{KeyEvent, PayloadError};
pub use frame::*;
