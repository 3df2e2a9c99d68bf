//! Instruction list optimizer.
//!
//! A handful of local rules run over the list until none of them fires:
//!
//! - **conversions**: `TOBOOL` is dropped when the next real instruction
//!   converts to boolean or discards the value anyway.
//! - **peephole**: a load followed directly by `POP` disappears, and
//!   `CONST_ES RETURN` becomes `RETURN_ES`. A trailing `RETURN_ES` is
//!   implied by the end of the code and removed.
//! - **jumps to jumps**: a branch whose target label is followed by a `JUMP`
//!   is pointed at the final destination of the chain.
//! - **jumps to next**: a `JUMP` over nothing but labels is deleted.
//! - **dead code**: everything after `JUMP`, `RETURN` or `RETURN_ES` up to
//!   the next referenced label is deleted.
//!
//! Each rule removes instructions or shortens a jump chain, so the loop
//! always terminates.

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use super::asm::{InsnId, Instruction, InstructionList, LabelId};
use super::opcode::Opcode;
use super::options::OptimizerOptions;

/// Optimizes `code` in place. Returns the number of fixpoint passes run.
pub fn optimize(code: &mut InstructionList, options: &OptimizerOptions) -> usize {
    let mut passes = 0;
    loop {
        passes += 1;
        let mut changed = false;

        if options.conversions {
            changed |= report("conversions", elide_conversions(code));
        }
        if options.peephole {
            changed |= report("peephole", peephole(code));
        }
        if options.jumps_to_jumps {
            changed |= report("jumps_to_jumps", jumps_to_jumps(code));
        }
        if options.jumps_to_next_instruction {
            changed |= report("jumps_to_next", jumps_to_next(code));
        }
        if options.dead_code {
            changed |= report("dead_code", dead_code(code));
        }

        if !changed {
            trace!(passes, instructions = code.len(), "optimizer reached fixpoint");
            return passes;
        }
    }
}

fn report(rule: &'static str, rewrites: usize) -> bool {
    if rewrites > 0 {
        debug!(rule, rewrites, "optimizer rule fired");
    }
    rewrites > 0
}

// ============================================================================
// Rules
// ============================================================================

/// Removes `TOBOOL` before instructions that convert or discard the value.
fn elide_conversions(code: &mut InstructionList) -> usize {
    let mut count = 0;
    let mut cursor = code.first();
    while let Some(id) = cursor {
        cursor = code.next(id);
        if code.get(id) != Some(Instruction::Simple(Opcode::ToBool)) {
            continue;
        }

        let consumer = code.skip_labels(code.next(id)).and_then(|next| code.get(next));
        let redundant = matches!(
            consumer,
            Some(Instruction::TJump(_))
                | Some(Instruction::Simple(
                    Opcode::ToBool | Opcode::Not | Opcode::ScAnd | Opcode::ScOr | Opcode::Pop
                ))
        );
        if redundant {
            code.remove(id);
            count += 1;
        }
    }
    count
}

fn is_plain_load(insn: Instruction) -> bool {
    matches!(
        insn,
        Instruction::LoadVar(_)
            | Instruction::LoadConst(_)
            | Instruction::Simple(
                Opcode::Const0
                    | Opcode::Const1
                    | Opcode::ConstM1
                    | Opcode::ConstEs
                    | Opcode::ConstInvalid
                    | Opcode::ConstTrue
                    | Opcode::ConstFalse
            )
    )
}

/// Local rewrites on adjacent instructions. Labels are not skipped.
fn peephole(code: &mut InstructionList) -> usize {
    let mut count = 0;
    let mut cursor = code.first();
    while let Some(id) = cursor {
        let Some(insn) = code.get(id) else {
            break;
        };
        let next = code.next(id);
        let next_insn = next.and_then(|n| code.get(n));
        cursor = next;

        match (insn, next, next_insn) {
            (load, Some(next), Some(Instruction::Simple(Opcode::Pop))) if is_plain_load(load) => {
                cursor = code.next(next);
                code.remove(id);
                code.remove(next);
                count += 1;
            }
            (
                Instruction::Simple(Opcode::ConstEs),
                Some(next),
                Some(Instruction::Simple(Opcode::Return)),
            ) => {
                code.remove(id);
                code.replace(next, Instruction::Simple(Opcode::ReturnEs));
                count += 1;
            }
            (Instruction::Simple(Opcode::ReturnEs), None, _) => {
                code.remove(id);
                count += 1;
            }
            _ => {}
        }
    }
    count
}

/// Where a jump to `label` ends up after following unconditional jumps.
/// Returns `None` for a cycle.
fn chain_end(code: &InstructionList, label: LabelId) -> Option<LabelId> {
    let mut seen = FxHashSet::default();
    seen.insert(label);
    let mut current = label;
    loop {
        let position = code.label_position(current)?;
        let landing = code.skip_labels(Some(position)).and_then(|id| code.get(id));
        match landing {
            Some(Instruction::Jump(next)) => {
                if !seen.insert(next) {
                    return None;
                }
                current = next;
            }
            _ => return Some(current),
        }
    }
}

/// Retargets branches that land on an unconditional jump.
fn jumps_to_jumps(code: &mut InstructionList) -> usize {
    let mut count = 0;
    let mut cursor = code.first();
    while let Some(id) = cursor {
        cursor = code.next(id);
        let Some(target) = code.get(id).and_then(|insn| insn.branch_target()) else {
            continue;
        };
        if let Some(end) = chain_end(code, target) {
            if end != target {
                code.retarget(id, end);
                count += 1;
            }
        }
    }
    count
}

/// Deletes `JUMP`s whose target is reached by falling through labels.
fn jumps_to_next(code: &mut InstructionList) -> usize {
    let mut count = 0;
    let mut cursor = code.first();
    while let Some(id) = cursor {
        cursor = code.next(id);
        let Some(Instruction::Jump(target)) = code.get(id) else {
            continue;
        };

        let mut scan = code.next(id);
        while let Some(next) = scan {
            match code.get(next) {
                Some(Instruction::Label(label)) if label == target => {
                    code.remove(id);
                    count += 1;
                    break;
                }
                Some(Instruction::Label(_)) => scan = code.next(next),
                _ => break,
            }
        }
    }
    count
}

/// Deletes unreachable instructions after unconditional control transfers.
fn dead_code(code: &mut InstructionList) -> usize {
    let mut count = 0;
    let mut cursor = code.first();
    while let Some(id) = cursor {
        let transfers = matches!(
            code.get(id),
            Some(Instruction::Jump(_))
                | Some(Instruction::Simple(Opcode::Return | Opcode::ReturnEs))
        );
        if transfers {
            count += remove_until_live_label(code, id);
        }
        cursor = code.next(id);
    }
    count
}

fn remove_until_live_label(code: &mut InstructionList, after: InsnId) -> usize {
    let mut count = 0;
    let mut scan = code.next(after);
    while let Some(id) = scan {
        if let Some(Instruction::Label(label)) = code.get(id) {
            if code.label_refs(label) > 0 {
                break;
            }
        }
        scan = code.next(id);
        code.remove(id);
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> OptimizerOptions {
        OptimizerOptions::default()
    }

    fn only(rule: impl FnOnce(&mut OptimizerOptions)) -> OptimizerOptions {
        let mut options = OptimizerOptions::none();
        rule(&mut options);
        options
    }

    #[test]
    fn test_dead_code_after_return() {
        let mut code = InstructionList::new();
        code.push(Instruction::LoadVar(0));
        code.emit(Opcode::Return);
        code.emit(Opcode::Const1);
        code.emit(Opcode::Return);

        optimize(&mut code, &only(|o| o.dead_code = true));
        assert_eq!(
            code.to_vec(),
            vec![Instruction::LoadVar(0), Instruction::Simple(Opcode::Return)]
        );
    }

    #[test]
    fn test_dead_code_stops_at_referenced_label() {
        let mut code = InstructionList::new();
        let live = code.new_label();
        let dead = code.new_label();
        code.push(Instruction::TJump(live));
        code.emit(Opcode::ReturnEs);
        code.place_label(dead);
        code.emit(Opcode::Const0);
        code.place_label(live);
        code.emit(Opcode::Const1);
        code.emit(Opcode::Return);

        optimize(&mut code, &only(|o| o.dead_code = true));
        assert_eq!(
            code.to_vec(),
            vec![
                Instruction::TJump(live),
                Instruction::Simple(Opcode::ReturnEs),
                Instruction::Label(live),
                Instruction::Simple(Opcode::Const1),
                Instruction::Simple(Opcode::Return),
            ]
        );
    }

    #[test]
    fn test_dead_branch_releases_label() {
        let mut code = InstructionList::new();
        let target = code.new_label();
        code.emit(Opcode::ReturnEs);
        code.push(Instruction::Jump(target));
        code.place_label(target);
        code.emit(Opcode::Const1);
        code.emit(Opcode::Return);

        optimize(&mut code, &only(|o| o.dead_code = true));
        // Once the dead jump is gone its label is unreferenced, so the
        // whole tail is unreachable.
        assert_eq!(code.to_vec(), vec![Instruction::Simple(Opcode::ReturnEs)]);
        assert_eq!(code.label_refs(target), 0);
    }

    #[test]
    fn test_jump_chain_collapses() {
        let mut code = InstructionList::new();
        let a = code.new_label();
        let b = code.new_label();
        let c = code.new_label();
        let first = code.push(Instruction::TJump(a));
        code.emit(Opcode::Const0);
        code.emit(Opcode::Return);
        code.place_label(a);
        code.push(Instruction::Jump(b));
        code.place_label(b);
        code.push(Instruction::Jump(c));
        code.place_label(c);
        code.emit(Opcode::Const1);
        code.emit(Opcode::Return);

        optimize(&mut code, &only(|o| o.jumps_to_jumps = true));
        assert_eq!(code.get(first), Some(Instruction::TJump(c)));
        assert_eq!(code.label_refs(a), 0);
        assert_eq!(code.label_refs(c), 3);
    }

    #[test]
    fn test_jump_cycle_is_left_alone() {
        let mut code = InstructionList::new();
        let a = code.new_label();
        let b = code.new_label();
        code.place_label(a);
        code.push(Instruction::Jump(b));
        code.place_label(b);
        code.push(Instruction::Jump(a));

        let before = code.to_vec();
        let passes = optimize(&mut code, &only(|o| o.jumps_to_jumps = true));
        assert_eq!(passes, 1);
        assert_eq!(code.to_vec(), before);
    }

    #[test]
    fn test_jump_to_next() {
        let mut code = InstructionList::new();
        let end = code.new_label();
        let other = code.new_label();
        code.push(Instruction::LoadVar(0));
        code.push(Instruction::Jump(end));
        code.place_label(other);
        code.place_label(end);
        code.emit(Opcode::Return);

        optimize(&mut code, &only(|o| o.jumps_to_next_instruction = true));
        assert_eq!(
            code.to_vec(),
            vec![
                Instruction::LoadVar(0),
                Instruction::Label(other),
                Instruction::Label(end),
                Instruction::Simple(Opcode::Return),
            ]
        );
    }

    #[test]
    fn test_conditional_jump_to_next_is_kept() {
        let mut code = InstructionList::new();
        let end = code.new_label();
        code.push(Instruction::LoadVar(0));
        code.push(Instruction::TJump(end));
        code.place_label(end);

        optimize(&mut code, &all());
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn test_peephole_rules() {
        let mut code = InstructionList::new();
        code.push(Instruction::LoadConst(4));
        code.emit(Opcode::Pop);
        code.emit(Opcode::ConstEs);
        code.emit(Opcode::Return);
        optimize(&mut code, &only(|o| o.peephole = true));
        // The load/POP pair goes, CONST_ES RETURN becomes RETURN_ES, and the
        // now trailing RETURN_ES goes too.
        assert!(code.is_empty());
    }

    #[test]
    fn test_peephole_does_not_skip_labels() {
        let mut code = InstructionList::new();
        let label = code.new_label();
        code.push(Instruction::TJump(label));
        code.push(Instruction::LoadVar(1));
        code.place_label(label);
        code.emit(Opcode::Pop);
        code.emit(Opcode::Const1);
        code.emit(Opcode::Return);

        let before = code.to_vec();
        optimize(&mut code, &only(|o| o.peephole = true));
        assert_eq!(code.to_vec(), before);
    }

    #[test]
    fn test_const_es_return() {
        let mut code = InstructionList::new();
        let label = code.new_label();
        code.push(Instruction::TJump(label));
        code.emit(Opcode::ConstEs);
        code.emit(Opcode::Return);
        code.place_label(label);
        code.emit(Opcode::Const1);
        code.emit(Opcode::Return);

        optimize(&mut code, &only(|o| o.peephole = true));
        assert_eq!(
            code.to_vec(),
            vec![
                Instruction::TJump(label),
                Instruction::Simple(Opcode::ReturnEs),
                Instruction::Label(label),
                Instruction::Simple(Opcode::Const1),
                Instruction::Simple(Opcode::Return),
            ]
        );
    }

    #[test]
    fn test_conversion_elision_skips_labels() {
        let mut code = InstructionList::new();
        let skip = code.new_label();
        let end = code.new_label();
        code.push(Instruction::LoadVar(0));
        code.emit(Opcode::ScAnd);
        code.push(Instruction::TJump(skip));
        code.push(Instruction::LoadVar(1));
        code.emit(Opcode::ToBool);
        code.place_label(skip);
        code.push(Instruction::TJump(end));
        code.place_label(end);

        optimize(&mut code, &only(|o| o.conversions = true));
        assert!(!code.to_vec().contains(&Instruction::Simple(Opcode::ToBool)));
    }

    #[test]
    fn test_conversion_kept_before_return() {
        let mut code = InstructionList::new();
        code.push(Instruction::LoadVar(1));
        code.emit(Opcode::ToBool);
        code.emit(Opcode::Return);

        optimize(&mut code, &all());
        assert_eq!(code.len(), 3);
    }

    #[test]
    fn test_disabled_rules_do_nothing() {
        let mut code = InstructionList::new();
        code.emit(Opcode::Const0);
        code.emit(Opcode::Pop);
        code.emit(Opcode::ReturnEs);
        code.emit(Opcode::Const1);
        let before = code.to_vec();
        assert_eq!(optimize(&mut code, &OptimizerOptions::none()), 1);
        assert_eq!(code.to_vec(), before);
    }

    #[test]
    fn test_idempotent() {
        let mut code = InstructionList::new();
        let top = code.new_label();
        let exit = code.new_label();
        let hop = code.new_label();
        code.place_label(top);
        code.push(Instruction::LoadVar(0));
        code.push(Instruction::TJump(hop));
        code.push(Instruction::IncrVar(0));
        code.push(Instruction::Jump(top));
        code.place_label(hop);
        code.push(Instruction::Jump(exit));
        code.emit(Opcode::Const0);
        code.place_label(exit);
        code.emit(Opcode::ConstEs);
        code.emit(Opcode::Return);

        optimize(&mut code, &all());
        let once = code.to_vec();
        assert_eq!(optimize(&mut code, &all()), 1);
        assert_eq!(code.to_vec(), once);
    }
}
