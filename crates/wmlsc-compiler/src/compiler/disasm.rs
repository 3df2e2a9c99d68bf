//! Function code disassembler.
//!
//! [`disassemble`] decodes raw function code into instructions with their
//! operands resolved; [`render_function`] formats one function of a module
//! as an assembler listing, naming call targets and showing constants.

use std::fmt::Write;

use super::opcode::{Opcode, Operands};
use crate::bytecode::{BytecodeModule, ByteReader, Constant, DecodeError};
use crate::stdlib::LibraryRegistry;

/// A decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedOperand {
    /// No operand
    None,
    /// Absolute code offset a branch lands on
    Branch {
        /// Target offset
        target: usize,
    },
    /// Variable slot
    Variable(u8),
    /// Constant pool index
    Constant(u16),
    /// Local function index
    Call {
        /// Function index
        function: u8,
    },
    /// Library function
    CallLib {
        /// Library index
        library: u16,
        /// Function index within the library
        function: u8,
    },
    /// Function in another unit
    CallUrl {
        /// Constant index of the unit URL
        url: u16,
        /// Constant index of the function name
        function: u16,
        /// Argument count
        args: u8,
    },
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Offset of the opcode byte
    pub offset: usize,
    /// Encoded size in bytes
    pub size: usize,
    /// The opcode
    pub opcode: Opcode,
    /// The operand
    pub operand: DecodedOperand,
}

/// Decodes function code.
pub fn disassemble(code: &[u8]) -> Result<Vec<DecodedInstruction>, DecodeError> {
    let mut reader = ByteReader::new(code);
    let mut out = Vec::new();

    while !reader.is_at_end() {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let (opcode, inline) =
            Opcode::decode(byte).ok_or(DecodeError::InvalidOpcode { opcode: byte, offset })?;

        let operand = match opcode.operands() {
            Operands::None => DecodedOperand::None,
            Operands::Inline5 | Operands::Inline4 | Operands::Inline3 => {
                inline_operand(opcode, inline)
            }
            Operands::Inline3Library => DecodedOperand::CallLib {
                library: u16::from(reader.read_u8()?),
                function: inline,
            },
            Operands::U8 => byte_operand(opcode, reader.read_u8()?),
            Operands::U16 => wide_operand(opcode, reader.read_u16()?),
            Operands::LibraryU8 => {
                let function = reader.read_u8()?;
                let library = u16::from(reader.read_u8()?);
                DecodedOperand::CallLib { library, function }
            }
            Operands::LibraryU16 => {
                let function = reader.read_u8()?;
                let library = reader.read_u16()?;
                DecodedOperand::CallLib { library, function }
            }
            Operands::UrlU8 => DecodedOperand::CallUrl {
                url: u16::from(reader.read_u8()?),
                function: u16::from(reader.read_u8()?),
                args: reader.read_u8()?,
            },
            Operands::UrlU16 => DecodedOperand::CallUrl {
                url: reader.read_u16()?,
                function: reader.read_u16()?,
                args: reader.read_u8()?,
            },
        };

        let size = reader.position() - offset;
        let operand = match operand {
            DecodedOperand::Branch { target: distance } => DecodedOperand::Branch {
                target: branch_target(opcode, offset, size, distance)?,
            },
            other => other,
        };

        out.push(DecodedInstruction {
            offset,
            size,
            opcode,
            operand,
        });
    }

    Ok(out)
}

// Branch operands carry the raw distance until the size is known.
fn inline_operand(opcode: Opcode, value: u8) -> DecodedOperand {
    match opcode {
        Opcode::LoadVarS | Opcode::StoreVarS | Opcode::IncrVarS => DecodedOperand::Variable(value),
        Opcode::LoadConstS => DecodedOperand::Constant(u16::from(value)),
        Opcode::CallS => DecodedOperand::Call { function: value },
        _ => DecodedOperand::Branch {
            target: usize::from(value),
        },
    }
}

fn byte_operand(opcode: Opcode, value: u8) -> DecodedOperand {
    match opcode {
        Opcode::LoadConst => DecodedOperand::Constant(u16::from(value)),
        Opcode::Call => DecodedOperand::Call { function: value },
        op if op.is_branch() => DecodedOperand::Branch {
            target: usize::from(value),
        },
        _ => DecodedOperand::Variable(value),
    }
}

fn wide_operand(opcode: Opcode, value: u16) -> DecodedOperand {
    match opcode {
        Opcode::LoadConstW => DecodedOperand::Constant(value),
        _ => DecodedOperand::Branch {
            target: usize::from(value),
        },
    }
}

fn branch_target(
    opcode: Opcode,
    offset: usize,
    size: usize,
    distance: usize,
) -> Result<usize, DecodeError> {
    if opcode.is_backward_branch() {
        offset
            .checked_sub(distance)
            .ok_or(DecodeError::ValueOutOfRange {
                offset,
                value: distance as u32,
            })
    } else {
        Ok(offset + size + distance)
    }
}

// ============================================================================
// Listing
// ============================================================================

/// What [`render_function`] needs to name things.
#[derive(Clone, Copy)]
pub struct DisasmContext<'a> {
    /// The module the function belongs to
    pub module: &'a BytecodeModule,
    /// Library names for `CALL_LIB`
    pub registry: &'a dyn LibraryRegistry,
}

/// Renders function `index` of the module as an assembler listing.
pub fn render_function(ctx: &DisasmContext<'_>, index: u8) -> Result<String, DecodeError> {
    let count = u8::try_from(ctx.module.functions().len()).unwrap_or(u8::MAX);
    let function = ctx
        .module
        .function(index)
        .ok_or(DecodeError::FunctionIndexOutOfRange { index, count })?;

    let mut out = String::new();
    for insn in disassemble(&function.code)? {
        let _ = write!(out, "0x{:04x}  {:<12}", insn.offset, insn.opcode.mnemonic());
        match insn.operand {
            DecodedOperand::None => {}
            DecodedOperand::Branch { target } => {
                let _ = write!(out, " 0x{target:04x}");
            }
            DecodedOperand::Variable(slot) => {
                let _ = write!(out, " {slot}");
            }
            DecodedOperand::Constant(c) => {
                let _ = write!(out, " {c}");
                if let Some(constant) = ctx.module.constant(c) {
                    let _ = write!(out, "  ; {constant}");
                }
            }
            DecodedOperand::Call { function } => {
                let _ = write!(out, " {function}");
                let name = ctx.module.function(function).and_then(|f| f.name.as_deref());
                if let Some(name) = name {
                    let _ = write!(out, "  ; {name}");
                }
            }
            DecodedOperand::CallLib { library, function } => {
                let _ = write!(out, " {library}.{function}");
                if let Some((lib, name)) = ctx.registry.name_of(library, function) {
                    let _ = write!(out, "  ; {lib}.{name}");
                }
            }
            DecodedOperand::CallUrl {
                url,
                function,
                args,
            } => {
                let _ = write!(out, " {url} {function} {args}");
                let url = ctx.module.constant(url).and_then(Constant::as_str);
                let name = ctx.module.constant(function).and_then(Constant::as_str);
                if let (Some(url), Some(name)) = (url, name) {
                    let _ = write!(out, "  ; {url}#{name}");
                }
            }
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Function, StringEncoding};
    use crate::stdlib::StandardLibrary;

    #[test]
    fn test_disassemble_simple() {
        let insns = disassemble(&[0xe0, 0x15, 0x20, 0x3a]).unwrap();
        let ops: Vec<_> = insns.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![Opcode::LoadVarS, Opcode::Const1, Opcode::Add, Opcode::Return]);
        assert_eq!(insns[0].operand, DecodedOperand::Variable(0));
        assert_eq!(insns[3].offset, 3);
    }

    #[test]
    fn test_branch_targets() {
        // 0: TJUMP_FW_S +2, 1: INCR_VAR_S 0, 2: JUMP_BW_S 2, 3: RETURN_ES
        let insns = disassemble(&[0xc2, 0x70, 0xa2, 0x3b]).unwrap();
        assert_eq!(insns[0].operand, DecodedOperand::Branch { target: 3 });
        assert_eq!(insns[2].operand, DecodedOperand::Branch { target: 0 });

        let insns = disassemble(&[0x02, 0x00, 0x01, 0x3c, 0x3b]).unwrap();
        assert_eq!(insns[0].size, 3);
        assert_eq!(insns[0].operand, DecodedOperand::Branch { target: 4 });
    }

    #[test]
    fn test_call_operands() {
        let insns = disassemble(&[0x6b, 0x02, 0x0b, 0x01, 0x01, 0x2c, 0x0c, 0x01, 0x02, 0x03])
            .unwrap();
        assert_eq!(
            insns[0].operand,
            DecodedOperand::CallLib {
                library: 2,
                function: 3
            }
        );
        assert_eq!(
            insns[1].operand,
            DecodedOperand::CallLib {
                library: 300,
                function: 1
            }
        );
        assert_eq!(
            insns[2].operand,
            DecodedOperand::CallUrl {
                url: 1,
                function: 2,
                args: 3
            }
        );
    }

    #[test]
    fn test_rejects_bad_code() {
        assert_eq!(
            disassemble(&[0x3b, 0x00]),
            Err(DecodeError::InvalidOpcode {
                opcode: 0x00,
                offset: 1
            })
        );
        assert_eq!(
            disassemble(&[0x78]),
            Err(DecodeError::InvalidOpcode {
                opcode: 0x78,
                offset: 0
            })
        );
        assert!(matches!(
            disassemble(&[0x13, 0x01]),
            Err(DecodeError::Truncated { .. })
        ));
        // A backward jump before the start of the code.
        assert!(matches!(
            disassemble(&[0xa5]),
            Err(DecodeError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_render_function() {
        let mut module = BytecodeModule::new(StringEncoding::Utf8);
        let greeting = module.add_string("hi").unwrap();
        assert_eq!(greeting, 0);
        module
            .add_function(Function {
                arguments: 0,
                locals: 0,
                code: vec![0x50, 0x68, 0x00, 0x60, 0x3a],
                name: Some("main".to_string()),
            })
            .unwrap();

        let ctx = DisasmContext {
            module: &module,
            registry: &StandardLibrary,
        };
        let listing = render_function(&ctx, 0).unwrap();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("0x0000  LOAD_CONST_S"));
        assert!(lines[0].ends_with("; \"hi\""));
        assert!(lines[1].ends_with("; Lang.abs"));
        assert!(lines[2].ends_with("; main"));
        assert!(lines[3].starts_with("0x0004  RETURN"));

        assert!(matches!(
            render_function(&ctx, 1),
            Err(DecodeError::FunctionIndexOutOfRange { index: 1, count: 1 })
        ));
    }
}
