#![warn(missing_docs)]

//! Real-time cyclic PROFINET I/O: frame construction, input dispatch, and
//! per-submodule payload codecs.

pub mod codec;
pub mod dispatch;
pub mod frame;
pub mod output;

pub use codec::{decode_input_slot, decode_output_slot, encode_input_slot, encode_output_slot, INPUT_SLOT_LEN, OUTPUT_SLOT_LEN};
pub use dispatch::{dispatch_input_frame, FrameIndex};
pub use frame::{build_output_frame, parse_frame, ParsedFrame, DATA_STATUS_GOOD, TRANSFER_STATUS_OK};
pub use output::emit_output_frame;
