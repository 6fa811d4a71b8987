//! DLP (Desktop Link Protocol): command definitions, argument codec and
//! device status codes.

pub mod args;
pub mod commands;
pub mod message;
pub mod records;
pub mod status;

pub use args::{ArgForm, ArgHeader, ArgId, ArgMap, ArgSlot, DecodeArg, DlpArg, RawArg};
pub use commands::{raw_command, CommandDef, DlpOpcode, DlpRegistry};
pub use message::{
    decode_request, decode_response, encode_request, encode_response, DlpRequest, DlpResponse,
    RESPONSE_FLAG,
};
pub use status::{DlpErrorCode, SyncTermCode};
