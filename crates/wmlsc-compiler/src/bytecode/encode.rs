//! Serialization of [`BytecodeModule`] to the WMLScript binary format.
//!
//! ```text
//! version (u8 = 0x01)
//! length  (mb_u_int32, bytes that follow)
//! constant pool:  count, charset, { type, payload }*
//! pragma pool:    count, { type, index+ }*
//! function pool:  count (u8), name table, { args, locals, size, code }*
//! ```

use tracing::trace;

use super::DecodeError;
use super::ieee754::{self, Float32};
use super::module::{
    BytecodeModule, Constant, Function, MAX_CONSTANTS, MAX_PRAGMAS, Pragma, StringEncoding,
    is_valid_function_name,
};
use super::varint::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

/// WMLScript 1.1.
pub const VERSION: u8 = 0x01;

const CONST_INT8: u8 = 0;
const CONST_INT16: u8 = 1;
const CONST_INT32: u8 = 2;
const CONST_FLOAT32: u8 = 3;
const CONST_UTF8: u8 = 4;
const CONST_EMPTY_STRING: u8 = 5;
const CONST_EXT_ENC_STRING: u8 = 6;

const PRAGMA_ACCESS_DOMAIN: u8 = 0;
const PRAGMA_ACCESS_PATH: u8 = 1;
const PRAGMA_UA_PROPERTY: u8 = 2;
const PRAGMA_UA_PROPERTY_AND_SCHEME: u8 = 3;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a module into its binary form.
pub fn encode(module: &BytecodeModule) -> Result<Vec<u8>> {
    let mut body = ByteWriter::new();
    write_constants(module, &mut body);
    write_pragmas(module, &mut body);
    write_functions(module, &mut body)?;

    let length = u32::try_from(body.len()).map_err(|_| Error::CodeTooLarge(body.len()))?;
    let mut out = ByteWriter::new();
    out.u8(VERSION).varint(length).bytes(body.as_bytes());

    trace!(
        constants = module.constants().len(),
        pragmas = module.pragmas().len(),
        functions = module.functions().len(),
        bytes = out.len(),
        "encoded module"
    );
    Ok(out.into_bytes())
}

fn write_constants(module: &BytecodeModule, w: &mut ByteWriter) {
    let encoding = module.string_encoding();
    w.varint(module.constants().len() as u32)
        .varint(encoding.mib_enum());

    for constant in module.constants() {
        match constant {
            Constant::Integer(v) => {
                if let Ok(v) = i8::try_from(*v) {
                    w.u8(CONST_INT8).i8(v);
                } else if let Ok(v) = i16::try_from(*v) {
                    w.u8(CONST_INT16).i16(v);
                } else {
                    w.u8(CONST_INT32).i32(*v);
                }
            }
            Constant::Float(v) => {
                w.u8(CONST_FLOAT32)
                    .bytes(&ieee754::encode_single(f64::from(*v)).bytes);
            }
            Constant::FloatNan => {
                w.u8(CONST_FLOAT32).bytes(&ieee754::NAN_BYTES);
            }
            Constant::FloatPositiveInfinity => {
                w.u8(CONST_FLOAT32).bytes(&ieee754::POSITIVE_INFINITY_BYTES);
            }
            Constant::FloatNegativeInfinity => {
                w.u8(CONST_FLOAT32).bytes(&ieee754::NEGATIVE_INFINITY_BYTES);
            }
            Constant::String(s) => match encoding {
                StringEncoding::Utf8 => {
                    w.u8(CONST_UTF8).varint(s.len() as u32).bytes(s.as_bytes());
                }
                StringEncoding::Latin1 => {
                    let bytes = to_latin1(s);
                    w.u8(CONST_EXT_ENC_STRING)
                        .varint(bytes.len() as u32)
                        .bytes(&bytes);
                }
            },
            Constant::EmptyString => {
                w.u8(CONST_EMPTY_STRING);
            }
        }
    }
}

/// Transcodes to ISO-8859-1, replacing anything above U+00FF with `?`.
fn to_latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn write_pragmas(module: &BytecodeModule, w: &mut ByteWriter) {
    w.varint(module.pragmas().len() as u32);
    for pragma in module.pragmas() {
        w.u8(pragma.kind());
        for index in pragma.constant_indices() {
            w.varint(u32::from(index));
        }
    }
}

fn write_functions(module: &BytecodeModule, w: &mut ByteWriter) -> Result<()> {
    let functions = module.functions();
    w.u8(functions.len() as u8);

    let named: Vec<(usize, &str)> = functions
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.name.as_deref().map(|n| (i, n)))
        .collect();
    w.u8(named.len() as u8);
    for (index, name) in named {
        w.u8(index as u8).u8(name.len() as u8).bytes(name.as_bytes());
    }

    for function in functions {
        let size = u32::try_from(function.code.len())
            .map_err(|_| Error::CodeTooLarge(function.code.len()))?;
        w.u8(function.arguments)
            .u8(function.locals)
            .varint(size)
            .bytes(&function.code);
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes a binary module. Either the whole input is accepted or an error
/// is returned; no partial module escapes.
pub fn decode(bytes: &[u8]) -> std::result::Result<BytecodeModule, DecodeError> {
    let mut r = ByteReader::new(bytes);

    let version = r.read_u8()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let declared = r.read_varint()?;
    if declared as usize != r.remaining() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: r.remaining(),
        });
    }

    let mut module = read_constants(&mut r)?;
    read_pragmas(&mut r, &mut module)?;
    read_functions(&mut r, &mut module)?;

    if !r.is_at_end() {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }
    Ok(module)
}

fn read_constants(r: &mut ByteReader<'_>) -> std::result::Result<BytecodeModule, DecodeError> {
    let offset = r.position();
    let count = r.read_varint()?;
    if count as usize > MAX_CONSTANTS {
        return Err(DecodeError::ValueOutOfRange {
            offset,
            value: count,
        });
    }

    let mib = r.read_varint()?;
    let encoding =
        StringEncoding::from_mib_enum(mib).ok_or(DecodeError::UnknownCharacterSet(mib))?;
    let mut module = BytecodeModule::new(encoding);

    for index in 0..count as u16 {
        let offset = r.position();
        let constant = match r.read_u8()? {
            CONST_INT8 => Constant::Integer(i32::from(r.read_i8()?)),
            CONST_INT16 => Constant::Integer(i32::from(r.read_i16()?)),
            CONST_INT32 => Constant::Integer(r.read_i32()?),
            CONST_FLOAT32 => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(r.read_bytes(4)?);
                match ieee754::decode_single(raw) {
                    Float32::Finite(v) => Constant::Float(v),
                    Float32::Nan => Constant::FloatNan,
                    Float32::PositiveInfinity => Constant::FloatPositiveInfinity,
                    Float32::NegativeInfinity => Constant::FloatNegativeInfinity,
                }
            }
            CONST_UTF8 => {
                let len = r.read_varint()? as usize;
                let data = r.read_bytes(len)?;
                let text =
                    std::str::from_utf8(data).map_err(|_| DecodeError::InvalidUtf8(index))?;
                if text.is_empty() {
                    Constant::EmptyString
                } else {
                    Constant::String(text.to_string())
                }
            }
            CONST_EMPTY_STRING => Constant::EmptyString,
            CONST_EXT_ENC_STRING => return Err(DecodeError::UnsupportedCharacterSet(index)),
            kind => return Err(DecodeError::UnknownConstantType { kind, offset }),
        };
        module.push_constant_raw(constant);
    }

    Ok(module)
}

fn read_pragmas(
    r: &mut ByteReader<'_>,
    module: &mut BytecodeModule,
) -> std::result::Result<(), DecodeError> {
    let offset = r.position();
    let count = r.read_varint()?;
    if count as usize > MAX_PRAGMAS {
        return Err(DecodeError::ValueOutOfRange {
            offset,
            value: count,
        });
    }

    for index in 0..count as u16 {
        let offset = r.position();
        let pragma = match r.read_u8()? {
            PRAGMA_ACCESS_DOMAIN => Pragma::AccessDomain(read_string_index(r, module, index)?),
            PRAGMA_ACCESS_PATH => Pragma::AccessPath(read_string_index(r, module, index)?),
            PRAGMA_UA_PROPERTY => Pragma::UserAgentProperty {
                name: read_string_index(r, module, index)?,
                value: read_string_index(r, module, index)?,
            },
            PRAGMA_UA_PROPERTY_AND_SCHEME => Pragma::UserAgentPropertyAndScheme {
                name: read_string_index(r, module, index)?,
                value: read_string_index(r, module, index)?,
                scheme: read_string_index(r, module, index)?,
            },
            kind => return Err(DecodeError::UnknownPragmaType { kind, offset }),
        };
        module.push_pragma_raw(pragma);
    }
    Ok(())
}

fn read_string_index(
    r: &mut ByteReader<'_>,
    module: &BytecodeModule,
    pragma: u16,
) -> std::result::Result<u16, DecodeError> {
    let constant = r.read_varint()?;
    let index = u16::try_from(constant)
        .ok()
        .filter(|i| module.constant(*i).is_some())
        .ok_or(DecodeError::ConstantIndexOutOfRange { pragma, constant })?;
    match module.constant(index) {
        Some(c) if c.is_string() => Ok(index),
        _ => Err(DecodeError::NotAString {
            pragma,
            constant: index,
        }),
    }
}

fn read_functions(
    r: &mut ByteReader<'_>,
    module: &mut BytecodeModule,
) -> std::result::Result<(), DecodeError> {
    let count = r.read_u8()?;
    let name_count = r.read_u8()?;

    let mut names: Vec<Option<String>> = vec![None; usize::from(count)];
    for _ in 0..name_count {
        let index = r.read_u8()?;
        let len = r.read_u8()?;
        let raw = r.read_bytes(usize::from(len))?;
        let name = String::from_utf8_lossy(raw).into_owned();
        if !is_valid_function_name(&name) {
            return Err(DecodeError::InvalidFunctionName(name));
        }

        let slot = names
            .get_mut(usize::from(index))
            .ok_or(DecodeError::FunctionIndexOutOfRange { index, count })?;
        if slot.is_some() {
            return Err(DecodeError::DuplicateFunctionName(index));
        }
        *slot = Some(name);
    }

    let mut seen = rustc_hash::FxHashSet::default();
    for (index, name) in names.iter().enumerate() {
        if let Some(name) = name {
            if !seen.insert(name.as_str()) {
                return Err(DecodeError::DuplicateFunctionName(index as u8));
            }
        }
    }

    for name in names {
        let arguments = r.read_u8()?;
        let locals = r.read_u8()?;
        let size = r.read_varint()? as usize;
        let code = r.read_bytes(size)?.to_vec();
        module.push_function_raw(Function {
            arguments,
            locals,
            code,
            name,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_module() -> BytecodeModule {
        let mut module = BytecodeModule::new(StringEncoding::Utf8);
        module.add_integer(5).unwrap();
        module.add_integer(-300).unwrap();
        module.add_integer(100_000).unwrap();
        module.add_float(1.5).unwrap();
        module.add_float(f32::NAN).unwrap();
        module.add_float(f32::NEG_INFINITY).unwrap();
        let domain = module.add_string("example.com").unwrap();
        let empty = module.add_string("").unwrap();
        let name = module.add_string("héllo").unwrap();
        module.add_pragma(Pragma::AccessDomain(domain)).unwrap();
        module
            .add_pragma(Pragma::UserAgentPropertyAndScheme {
                name,
                value: empty,
                scheme: domain,
            })
            .unwrap();
        module
            .add_function(Function {
                arguments: 1,
                locals: 0,
                code: vec![0xe0, 0x15, 0x20, 0x3a],
                name: Some("main".into()),
            })
            .unwrap();
        module
            .add_function(Function {
                arguments: 0,
                locals: 2,
                code: vec![0x3b],
                name: None,
            })
            .unwrap();
        module
    }

    #[test]
    fn test_encode_minimal_module() {
        let mut module = BytecodeModule::new(StringEncoding::Utf8);
        module
            .add_function(Function {
                arguments: 0,
                locals: 0,
                code: vec![0x3b],
                name: Some("f".into()),
            })
            .unwrap();
        let bytes = encode(&module).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x01, 0x0c, // version, length
                0x00, 0x6a, // no constants, UTF-8
                0x00, // no pragmas
                0x01, 0x01, 0x00, 0x01, b'f', // one function, one name
                0x00, 0x00, 0x01, 0x3b,
            ]
        );
    }

    #[test]
    fn test_integer_widths() {
        let mut module = BytecodeModule::default();
        module.add_integer(-128).unwrap();
        module.add_integer(128).unwrap();
        module.add_integer(40_000).unwrap();
        let bytes = encode(&module).unwrap();
        assert_eq!(
            &bytes[2..14],
            &[
                0x03, 0x6a, 0x00, 0x80, 0x01, 0x00, 0x80, 0x02, 0x00, 0x00, 0x9c, 0x40
            ]
        );
    }

    #[test]
    fn test_round_trip() {
        let module = sample_module();
        let bytes = encode(&module).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(encode(&decoded).unwrap(), bytes);
        assert_eq!(decoded.function_index_by_name("main"), Some(0));
    }

    #[test]
    fn test_latin1_strings() {
        let mut module = BytecodeModule::new(StringEncoding::Latin1);
        module.add_string("é€").unwrap();
        let bytes = encode(&module).unwrap();
        assert_eq!(&bytes[2..9], &[0x01, 0x04, 0x06, 0x02, 0xe9, b'?', 0x00]);
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedCharacterSet(0)));
    }

    #[test]
    fn test_decode_rejects_version_and_length() {
        let mut bytes = encode(&sample_module()).unwrap();
        bytes[0] = 0x02;
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(2)));

        let mut bytes = encode(&sample_module()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::LengthMismatch { .. })
        ));

        let bytes = encode(&sample_module()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(matches!(decode(&[]), Err(DecodeError::Truncated { offset: 0 })));
    }

    fn wrap(body: &[u8]) -> Vec<u8> {
        let mut out = ByteWriter::new();
        out.u8(VERSION).varint(body.len() as u32).bytes(body);
        out.into_bytes()
    }

    #[test]
    fn test_decode_rejects_bad_pools() {
        // Unknown character set.
        assert_eq!(
            decode(&wrap(&[0x00, 0x05, 0x00, 0x00, 0x00])),
            Err(DecodeError::UnknownCharacterSet(5))
        );
        // Unknown constant type.
        assert!(matches!(
            decode(&wrap(&[0x01, 0x6a, 0x09, 0x00, 0x00, 0x00])),
            Err(DecodeError::UnknownConstantType { kind: 9, .. })
        ));
        // Invalid UTF-8.
        assert_eq!(
            decode(&wrap(&[0x01, 0x6a, 0x04, 0x01, 0xff, 0x00, 0x00, 0x00])),
            Err(DecodeError::InvalidUtf8(0))
        );
        // Pragma pointing at an integer.
        assert!(matches!(
            decode(&wrap(&[0x01, 0x6a, 0x00, 0x07, 0x01, 0x00, 0x00, 0x00, 0x00])),
            Err(DecodeError::NotAString { .. })
        ));
        // Pragma pointing past the pool.
        assert!(matches!(
            decode(&wrap(&[0x00, 0x6a, 0x01, 0x01, 0x03, 0x00, 0x00])),
            Err(DecodeError::ConstantIndexOutOfRange { constant: 3, .. })
        ));
        // Unknown pragma type.
        assert!(matches!(
            decode(&wrap(&[0x00, 0x6a, 0x01, 0x04, 0x00, 0x00])),
            Err(DecodeError::UnknownPragmaType { kind: 4, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_names() {
        let function = [0x00, 0x00, 0x01, 0x3b];

        let mut body = vec![0x00, 0x6a, 0x00, 0x01, 0x01, 0x03, 0x01, b'f'];
        body.extend_from_slice(&function);
        assert_eq!(
            decode(&wrap(&body)),
            Err(DecodeError::FunctionIndexOutOfRange { index: 3, count: 1 })
        );

        let mut body = vec![0x00, 0x6a, 0x00, 0x01, 0x01, 0x00, 0x02, b'1', b'f'];
        body.extend_from_slice(&function);
        assert!(matches!(
            decode(&wrap(&body)),
            Err(DecodeError::InvalidFunctionName(_))
        ));

        let mut body = vec![
            0x00, 0x6a, 0x00, 0x01, 0x02, 0x00, 0x01, b'f', 0x00, 0x01, b'g',
        ];
        body.extend_from_slice(&function);
        assert_eq!(
            decode(&wrap(&body)),
            Err(DecodeError::DuplicateFunctionName(0))
        );

        let mut body = vec![
            0x00, 0x6a, 0x00, 0x02, 0x02, 0x00, 0x01, b'f', 0x01, 0x01, b'f',
        ];
        body.extend_from_slice(&function);
        body.extend_from_slice(&function);
        assert_eq!(
            decode(&wrap(&body)),
            Err(DecodeError::DuplicateFunctionName(1))
        );
    }
}
