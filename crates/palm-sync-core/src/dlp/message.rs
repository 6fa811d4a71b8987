//! DLP request and response bodies.
//!
//! ```text
//! request:  opcode | argc | (header | bytes)*
//! response: opcode|0x80 | argc | error:16 | (header | bytes)*
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::dlp::args::{ArgHeader, ArgMap, ArgSlot};
use crate::dlp::commands::{CommandDef, DlpOpcode, DlpRegistry};
use crate::dlp::status::DlpErrorCode;
use crate::error::{ProtocolError, ProtocolResult};
use crate::wire::WireRead;

/// High bit set on the opcode of every response.
pub const RESPONSE_FLAG: u8 = 0x80;

/// Decoded response.
#[derive(Debug)]
pub struct DlpResponse {
    pub error_code: DlpErrorCode,
    /// Empty whenever `error_code` is not success.
    pub args: ArgMap,
}

/// Decoded request, as seen by a device.
#[derive(Debug)]
pub struct DlpRequest {
    pub opcode: DlpOpcode,
    pub args: ArgMap,
}

fn encode_args(
    command: &'static str,
    slots: &[ArgSlot],
    args: &ArgMap,
) -> ProtocolResult<(u8, BytesMut)> {
    for id in args.ids() {
        if !slots.iter().any(|slot| slot.id == id) {
            return Err(ProtocolError::UnknownArgument { command, id: id.0 });
        }
    }

    let mut body = BytesMut::new();
    let mut count = 0u8;
    for slot in slots {
        let Some(value) = args.get_dyn(slot.id) else {
            if slot.optional {
                continue;
            }
            return Err(ProtocolError::MissingArgument {
                command,
                name: slot.name,
            });
        };
        if !slot.accepts(value) {
            return Err(ProtocolError::ArgumentType {
                name: slot.name,
                expected: slot.type_name(),
                actual: value.type_name().to_string(),
            });
        }

        value
            .check()
            .map_err(|source| ProtocolError::ArgumentOverflow {
                name: slot.name,
                source,
            })?;
        let len = value.encoded_len();
        let header = ArgHeader::for_len(slot.id, len).ok_or(ProtocolError::ArgumentTooLarge {
            name: slot.name,
            size: len,
        })?;
        header.encode(&mut body);
        let start = body.len();
        value.encode(&mut body);
        debug_assert_eq!(body.len() - start, len, "{} encoded_len mismatch", slot.name);
        count += 1;
    }
    Ok((count, body))
}

fn decode_args(
    command: &'static str,
    slots: &[ArgSlot],
    argc: u8,
    data: &mut Bytes,
) -> ProtocolResult<ArgMap> {
    let mut args = ArgMap::new();
    for _ in 0..argc {
        let header = ArgHeader::decode(data)?;
        let slot = slots
            .iter()
            .find(|slot| slot.id == header.id)
            .ok_or(ProtocolError::UnknownArgument {
                command,
                id: header.id.0,
            })?;
        let raw = data.take_bytes(header.len)?;
        args.insert_boxed(slot.id, slot.decode(raw)?);
    }

    if let Some(missing) = slots
        .iter()
        .find(|slot| !slot.optional && !args.contains(slot.id))
    {
        return Err(ProtocolError::MissingArgument {
            command,
            name: missing.name,
        });
    }

    if !data.is_empty() {
        tracing::trace!(command, trailing = data.len(), "ignoring bytes after last argument");
    }
    Ok(args)
}

/// Serialize a request for `def`.
pub fn encode_request(def: &CommandDef, args: &ArgMap) -> ProtocolResult<Bytes> {
    let (count, body) = encode_args(def.name, &def.request, args)?;
    let mut buf = BytesMut::with_capacity(2 + body.len());
    buf.put_u8(def.opcode.0);
    buf.put_u8(count);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Parse a response to `def`.
///
/// A non-success error code is returned as-is with no arguments decoded;
/// callers decide how to surface it.
pub fn decode_response(def: &CommandDef, mut data: Bytes) -> ProtocolResult<DlpResponse> {
    let opcode = data.take_u8()? & !RESPONSE_FLAG;
    if opcode != def.opcode.0 {
        return Err(ProtocolError::OpcodeMismatch {
            expected: def.opcode.0,
            actual: opcode,
        });
    }
    let argc = data.take_u8()?;
    let error_code = DlpErrorCode(data.take_u16()?);
    if !error_code.is_success() {
        return Ok(DlpResponse {
            error_code,
            args: ArgMap::new(),
        });
    }

    let args = decode_args(def.name, &def.response, argc, &mut data)?;
    Ok(DlpResponse { error_code, args })
}

/// Parse a request against the commands in `registry`.
pub fn decode_request(registry: &DlpRegistry, mut data: Bytes) -> ProtocolResult<DlpRequest> {
    let opcode = DlpOpcode(data.take_u8()?);
    let def = registry.lookup(opcode)?;
    let argc = data.take_u8()?;
    let args = decode_args(def.name, &def.request, argc, &mut data)?;
    Ok(DlpRequest { opcode, args })
}

/// Serialize a response to `def`. Arguments are omitted when
/// `error_code` is not success.
pub fn encode_response(
    def: &CommandDef,
    error_code: DlpErrorCode,
    args: &ArgMap,
) -> ProtocolResult<Bytes> {
    let (count, body) = if error_code.is_success() {
        encode_args(def.name, &def.response, args)?
    } else {
        (0, BytesMut::new())
    };
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u8(def.opcode.0 | RESPONSE_FLAG);
    buf.put_u8(count);
    buf.put_u16(error_code.0);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlp::args::{ArgId, DlpArg, RawArg};
    use crate::dlp::commands::raw_command;
    use crate::dlp::records::{DbHandle, DlpDateTime, ReadDbListRequest, UserInfo};
    use crate::dlp::status::SyncTermCode;
    use crate::error::CodecError;

    fn user_info() -> UserInfo {
        UserInfo {
            user_id: 42,
            viewer_id: 0,
            last_sync_pc_id: 0x0a00_0001,
            successful_sync_date: DlpDateTime::NEVER,
            last_sync_date: DlpDateTime::NEVER,
            user_name: "Test User".into(),
            password: vec![0x11; 10],
        }
    }

    #[test]
    fn test_tiny_argument_header() {
        let def = raw_command(DlpOpcode(0x50), "Vendor", 1, 0);
        let args = ArgMap::new().with(ArgId::FIRST, RawArg(Bytes::from(vec![0u8; 200])));
        let encoded = encode_request(&def, &args).unwrap();
        assert_eq!(&encoded[..4], &[0x50, 0x01, 0x20, 200]);
        assert_eq!(encoded.len(), 4 + 200);
    }

    #[test]
    fn test_small_argument_header() {
        let def = raw_command(DlpOpcode(0x50), "Vendor", 1, 0);
        let args = ArgMap::new().with(ArgId::FIRST, RawArg(Bytes::from(vec![0u8; 1000])));
        let encoded = encode_request(&def, &args).unwrap();
        assert_eq!(&encoded[..6], &[0x50, 0x01, 0xa0, 0x00, 0x03, 0xe8]);
    }

    #[test]
    fn test_oversize_argument_rejected() {
        let def = raw_command(DlpOpcode(0x50), "Vendor", 1, 0);
        let args = ArgMap::new().with(ArgId::FIRST, RawArg(Bytes::from(vec![0u8; 70_000])));
        assert!(matches!(
            encode_request(&def, &args),
            Err(ProtocolError::ArgumentTooLarge { size: 70_000, .. })
        ));
    }

    #[test]
    fn test_overlong_user_name_rejected() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_USER_INFO).unwrap();
        let info = UserInfo {
            user_name: "x".repeat(300),
            ..user_info()
        };
        let args = ArgMap::new().with(ArgId::FIRST, info);
        let err = encode_response(def, DlpErrorCode::NONE, &args).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ArgumentOverflow {
                source: CodecError::FieldTooLong {
                    field: "user name",
                    len: 301,
                    max: 255
                },
                ..
            }
        ));
    }

    #[test]
    fn test_missing_required_argument() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_DB_LIST).unwrap();
        assert!(matches!(
            encode_request(def, &ArgMap::new()),
            Err(ProtocolError::MissingArgument { name: "query", .. })
        ));
    }

    #[test]
    fn test_optional_absent_is_skipped() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_SYS_INFO).unwrap();
        let encoded = encode_request(def, &ArgMap::new()).unwrap();
        assert_eq!(&encoded[..], &[0x12, 0x00]);
    }

    #[test]
    fn test_wrong_argument_type() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::CLOSE_DB).unwrap();
        let args = ArgMap::new().with(ArgId::FIRST, SyncTermCode::Okay);
        assert!(matches!(
            encode_request(def, &args),
            Err(ProtocolError::ArgumentType { name: "handle", .. })
        ));
    }

    #[test]
    fn test_read_user_info_response() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_USER_INFO).unwrap();

        let request = encode_request(def, &ArgMap::new()).unwrap();
        assert_eq!(&request[..], &[0x10, 0x00]);

        let info = user_info();
        let mut body = BytesMut::new();
        info.encode(&mut body);
        assert_eq!(body.len(), 50);

        let mut response = BytesMut::new();
        response.put_slice(&[0x90, 0x01, 0x00, 0x00]);
        response.put_slice(&[0xa0, 0x00, 0x00, 0x32]);
        response.put_slice(&body);

        let decoded = decode_response(def, response.freeze()).unwrap();
        assert!(decoded.error_code.is_success());
        assert_eq!(decoded.args.len(), 1);
        assert_eq!(decoded.args.get::<UserInfo>(ArgId::FIRST), Some(&info));
    }

    #[test]
    fn test_error_code_skips_arguments() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_DB_LIST).unwrap();
        let response = Bytes::from_static(&[0x96, 0x01, 0x00, 0x05, 0xff, 0xff]);
        let decoded = decode_response(def, response).unwrap();
        assert_eq!(decoded.error_code, DlpErrorCode::NOT_FOUND);
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_opcode_mismatch() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_USER_INFO).unwrap();
        let response = Bytes::from_static(&[0x92, 0x00, 0x00, 0x00]);
        assert!(matches!(
            decode_response(def, response),
            Err(ProtocolError::OpcodeMismatch {
                expected: 0x10,
                actual: 0x12
            })
        ));
    }

    #[test]
    fn test_missing_required_response_argument() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::OPEN_DB).unwrap();
        let response = Bytes::from_static(&[0x97, 0x00, 0x00, 0x00]);
        assert!(matches!(
            decode_response(def, response),
            Err(ProtocolError::MissingArgument { name: "handle", .. })
        ));
    }

    #[test]
    fn test_unknown_response_argument() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::OPEN_DB).unwrap();
        let response = Bytes::from_static(&[0x97, 0x01, 0x00, 0x00, 0x25, 0x01, 0x07]);
        assert!(matches!(
            decode_response(def, response),
            Err(ProtocolError::UnknownArgument { id: 0x25, .. })
        ));
    }

    #[test]
    fn test_long_form_response_argument() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::OPEN_DB).unwrap();
        let response = Bytes::from_static(&[
            0x97, 0x01, 0x00, 0x00, 0x60, 0x00, 0x00, 0x00, 0x00, 0x01, 0x04,
        ]);
        let decoded = decode_response(def, response).unwrap();
        assert_eq!(decoded.args.get::<DbHandle>(ArgId::FIRST), Some(&DbHandle(4)));
    }

    #[test]
    fn test_device_side_roundtrip() {
        let registry = DlpRegistry::standard();
        let def = registry.lookup(DlpOpcode::READ_DB_LIST).unwrap();
        let args = ArgMap::new().with(ArgId::FIRST, ReadDbListRequest::ram(3));
        let request = encode_request(def, &args).unwrap();

        let decoded = decode_request(&registry, request).unwrap();
        assert_eq!(decoded.opcode, DlpOpcode::READ_DB_LIST);
        assert_eq!(
            decoded.args.get::<ReadDbListRequest>(ArgId::FIRST),
            Some(&ReadDbListRequest::ram(3))
        );

        let response = encode_response(def, DlpErrorCode::NOT_FOUND, &ArgMap::new()).unwrap();
        assert_eq!(&response[..], &[0x96, 0x00, 0x00, 0x05]);
    }

    #[test]
    fn test_unknown_request_opcode() {
        let registry = DlpRegistry::standard();
        assert!(matches!(
            decode_request(&registry, Bytes::from_static(&[0x7e, 0x00])),
            Err(ProtocolError::UnknownOpcode(0x7e))
        ));
    }
}
