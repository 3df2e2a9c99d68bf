//! Final encoding of an instruction list into function code.
//!
//! Operand pseudo instructions have one best encoding that depends only on
//! their operands, so they are resolved up front. Branches are harder: the
//! width of a jump depends on its distance, which depends on the widths of
//! every jump in between. All branches start in their widest form; each
//! pass lays the code out with the current forms and narrows every branch
//! whose distance now fits a smaller encoding. Distances can only shrink,
//! so forms only narrow and the passes converge.

use rustc_hash::FxHashMap;
use tracing::trace;

use super::asm::{Instruction, InstructionList, LabelId};
use super::opcode::{Opcode, Operands};
use crate::error::{Error, Result};

/// Largest distance the 16-bit branch forms can encode.
pub const MAX_BRANCH_DISTANCE: u32 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Debug)]
enum Item {
    Label(LabelId),
    Bytes(Vec<u8>),
    Branch {
        conditional: bool,
        direction: Direction,
        target: LabelId,
        form: Opcode,
    },
}

impl Item {
    fn size(&self) -> usize {
        match self {
            Item::Label(_) => 0,
            Item::Bytes(bytes) => bytes.len(),
            Item::Branch { form, .. } => form.size(),
        }
    }
}

/// Encodes `code` into bytes. Empty code becomes a lone `RETURN_ES`.
pub fn linearize(code: &InstructionList) -> Result<Vec<u8>> {
    let mut items = Vec::with_capacity(code.len());
    let mut label_items = FxHashMap::default();

    for (_, insn) in code.iter() {
        if let Instruction::Label(label) = insn {
            label_items.insert(label, items.len());
        }
        items.push(resolve_operands(insn)?);
    }

    // Now that every label has a position, pick directions.
    for (index, item) in items.iter_mut().enumerate() {
        if let Item::Branch {
            conditional,
            direction,
            target,
            form,
        } = item
        {
            let label_index = *label_items
                .get(&*target)
                .ok_or_else(|| Error::Internal(format!("branch to unplaced label {target}")))?;
            *direction = if label_index > index {
                Direction::Forward
            } else {
                Direction::Backward
            };
            *form = widest_form(*conditional, *direction);
        }
    }

    let mut passes = 0;
    let offsets = loop {
        passes += 1;
        let offsets = layout(&items);
        let mut narrowed = false;

        for (index, item) in items.iter_mut().enumerate() {
            let Item::Branch {
                conditional,
                direction,
                target,
                form,
            } = item
            else {
                continue;
            };
            let distance = branch_distance(&offsets, &label_items, index, *target, *direction, *form)?;
            let fitted = narrowest_form(*conditional, *direction, distance)?;
            if fitted != *form {
                *form = fitted;
                narrowed = true;
            }
        }

        if !narrowed {
            break offsets;
        }
    };
    trace!(passes, items = items.len(), "branch forms converged");

    let mut out = Vec::with_capacity(offsets.last().copied().unwrap_or(0));
    for (index, item) in items.iter().enumerate() {
        match item {
            Item::Label(_) => {}
            Item::Bytes(bytes) => out.extend_from_slice(bytes),
            Item::Branch {
                target,
                direction,
                form,
                ..
            } => {
                let distance =
                    branch_distance(&offsets, &label_items, index, *target, *direction, *form)?;
                encode_branch(&mut out, *form, distance);
            }
        }
    }

    if out.is_empty() {
        out.push(Opcode::ReturnEs.byte());
    }
    Ok(out)
}

/// Offset of every item, plus the total size as the final entry.
fn layout(items: &[Item]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(items.len() + 1);
    let mut offset = 0;
    for item in items {
        offsets.push(offset);
        offset += item.size();
    }
    offsets.push(offset);
    offsets
}

fn branch_distance(
    offsets: &[usize],
    label_items: &FxHashMap<LabelId, usize>,
    index: usize,
    target: LabelId,
    direction: Direction,
    form: Opcode,
) -> Result<u32> {
    let label_offset = label_items
        .get(&target)
        .map(|&i| offsets[i])
        .ok_or_else(|| Error::Internal(format!("branch to unplaced label {target}")))?;
    let start = offsets[index];
    let distance = match direction {
        Direction::Forward => label_offset.checked_sub(start + form.size()),
        Direction::Backward => start.checked_sub(label_offset),
    };
    let distance =
        distance.ok_or_else(|| Error::Internal(format!("branch to {target} points the wrong way")))?;
    u32::try_from(distance).map_err(|_| Error::BranchOutOfRange { distance: u32::MAX })
}

fn widest_form(conditional: bool, direction: Direction) -> Opcode {
    match (conditional, direction) {
        (false, Direction::Forward) => Opcode::JumpFwW,
        (false, Direction::Backward) => Opcode::JumpBwW,
        (true, Direction::Forward) => Opcode::TJumpFwW,
        (true, Direction::Backward) => Opcode::TJumpBwW,
    }
}

fn narrowest_form(conditional: bool, direction: Direction, distance: u32) -> Result<Opcode> {
    if distance > MAX_BRANCH_DISTANCE {
        return Err(Error::BranchOutOfRange { distance });
    }
    let (short, byte, wide) = match (conditional, direction) {
        (false, Direction::Forward) => (Some(Opcode::JumpFwS), Opcode::JumpFw, Opcode::JumpFwW),
        (false, Direction::Backward) => (Some(Opcode::JumpBwS), Opcode::JumpBw, Opcode::JumpBwW),
        (true, Direction::Forward) => (Some(Opcode::TJumpFwS), Opcode::TJumpFw, Opcode::TJumpFwW),
        // There is no short backward conditional jump.
        (true, Direction::Backward) => (None, Opcode::TJumpBw, Opcode::TJumpBwW),
    };
    Ok(match short {
        Some(short) if distance <= 0x1f => short,
        _ if distance <= 0xff => byte,
        _ => wide,
    })
}

fn encode_branch(out: &mut Vec<u8>, form: Opcode, distance: u32) {
    match form.operands() {
        Operands::Inline5 => out.push(form.byte() | distance as u8),
        Operands::U8 => out.extend_from_slice(&[form.byte(), distance as u8]),
        _ => {
            out.push(form.byte());
            out.extend_from_slice(&(distance as u16).to_be_bytes());
        }
    }
}

/// Chooses the encoding of everything but branches.
fn resolve_operands(insn: Instruction) -> Result<Item> {
    let bytes = match insn {
        Instruction::Label(label) => return Ok(Item::Label(label)),
        Instruction::Jump(target) | Instruction::TJump(target) => {
            return Ok(Item::Branch {
                conditional: matches!(insn, Instruction::TJump(_)),
                direction: Direction::Forward,
                target,
                form: Opcode::JumpFwW,
            });
        }
        Instruction::Call(index) => {
            if index <= 7 {
                vec![Opcode::CallS.byte() | index]
            } else {
                vec![Opcode::Call.byte(), index]
            }
        }
        Instruction::CallLib { library, function } => match u8::try_from(library) {
            Ok(library) if function <= 7 => vec![Opcode::CallLibS.byte() | function, library],
            Ok(library) => vec![Opcode::CallLib.byte(), function, library],
            Err(_) => {
                let [hi, lo] = library.to_be_bytes();
                vec![Opcode::CallLibW.byte(), function, hi, lo]
            }
        },
        Instruction::CallUrl {
            url,
            function,
            args,
        } => match (u8::try_from(url), u8::try_from(function)) {
            (Ok(url), Ok(function)) => vec![Opcode::CallUrl.byte(), url, function, args],
            _ => {
                let [url_hi, url_lo] = url.to_be_bytes();
                let [fn_hi, fn_lo] = function.to_be_bytes();
                vec![Opcode::CallUrlW.byte(), url_hi, url_lo, fn_hi, fn_lo, args]
            }
        },
        Instruction::LoadVar(v) => short_or_byte(Opcode::LoadVarS, Opcode::LoadVar, v),
        Instruction::StoreVar(v) => short_or_byte(Opcode::StoreVarS, Opcode::StoreVar, v),
        Instruction::IncrVar(v) => short_or_byte(Opcode::IncrVarS, Opcode::IncrVar, v),
        Instruction::LoadConst(c) => {
            if c <= 0x0f {
                vec![Opcode::LoadConstS.byte() | c as u8]
            } else if let Ok(c) = u8::try_from(c) {
                vec![Opcode::LoadConst.byte(), c]
            } else {
                let [hi, lo] = c.to_be_bytes();
                vec![Opcode::LoadConstW.byte(), hi, lo]
            }
        }
        Instruction::DecrVar(v) => vec![Opcode::DecrVar.byte(), v],
        Instruction::AddAsg(v) => vec![Opcode::AddAsg.byte(), v],
        Instruction::SubAsg(v) => vec![Opcode::SubAsg.byte(), v],
        Instruction::Simple(op) => {
            if op.operands() != Operands::None {
                return Err(Error::Internal(format!("{op} used without its operand")));
            }
            vec![op.byte()]
        }
    };
    Ok(Item::Bytes(bytes))
}

fn short_or_byte(short: Opcode, long: Opcode, operand: u8) -> Vec<u8> {
    match short.inline_max() {
        Some(max) if operand <= max => vec![short.byte() | operand],
        _ => vec![long.byte(), operand],
    }
}
