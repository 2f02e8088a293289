//! PROFINET DCE/RPC codec: Connect/Control PDUs over UDP port 0x8894,
//! the mixed-endian header, and PNIO block framing.

pub mod block;
pub mod connect;
pub mod control;
pub mod header;
pub mod opnum;
pub mod pnio_status;
pub mod words;

pub use block::{read_all_blocks, read_block, write_block, BlockType, RawBlock};
pub use connect::{
    build_connect_request, build_connect_response, parse_connect_request, parse_connect_response,
    AssignedIocr, ConnectConfirmation, ConnectRequestParams, ExpectedModuleEntry, IocrSpec,
    NDR_PREFIX_LEN, PNIO_STATUS_LEN,
};
pub use control::{
    build_control_request, build_control_response, parse_control_request, parse_control_response,
    ControlCommand, ControlConfirmation, ControlRequest, Originator,
};
pub use header::{PacketType, RpcHeader, HEADER_LEN};
pub use opnum::Opnum;
pub use pnio_status::{decode_pnio_status, is_success, rpc_analyze_error, FailedBlock, RecoveryAction};
pub use words::{be_u16, be_u32, PnioWord16, PnioWord32, RpcWord16, RpcWord32};
