//! Symbolic instruction lists.
//!
//! Code generation produces an [`InstructionList`]: a doubly linked list
//! stored in an index arena. Nodes are addressed by [`InsnId`], which stays
//! valid for the lifetime of the list; removing a node only unlinks it.
//! Branches target a [`LabelId`], and each label keeps a count of the
//! branches that refer to it so the optimizer can tell live labels from
//! dead ones.

use std::fmt::{self, Write};

use super::opcode::Opcode;

/// Stable handle to a node in an [`InstructionList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(usize);

/// Stable handle to a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(usize);

impl LabelId {
    /// Position of the label in allocation order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// A symbolic instruction.
///
/// The pseudo instructions have several concrete encodings; the linearizer
/// picks one once operands and branch distances are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Branch target
    Label(LabelId),
    /// Unconditional jump
    Jump(LabelId),
    /// Pop, jump if the value is false
    TJump(LabelId),
    /// Call a local function
    Call(u8),
    /// Call a library function
    CallLib {
        /// Library index
        library: u16,
        /// Function index within the library
        function: u8,
    },
    /// Call a function in another compilation unit
    CallUrl {
        /// Constant index of the unit URL
        url: u16,
        /// Constant index of the function name
        function: u16,
        /// Number of arguments
        args: u8,
    },
    /// Push a variable
    LoadVar(u8),
    /// Pop into a variable
    StoreVar(u8),
    /// Increment a variable in place
    IncrVar(u8),
    /// Push a constant
    LoadConst(u16),
    /// Decrement a variable in place
    DecrVar(u8),
    /// Pop and add to a variable
    AddAsg(u8),
    /// Pop and subtract from a variable
    SubAsg(u8),
    /// An operand-free opcode
    Simple(Opcode),
}

impl Instruction {
    /// The label a branch refers to.
    pub fn branch_target(&self) -> Option<LabelId> {
        match self {
            Instruction::Jump(label) | Instruction::TJump(label) => Some(*label),
            _ => None,
        }
    }

    /// Returns true for label pseudo instructions.
    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    /// Returns true if `self` is the simple opcode `op`.
    pub fn is(&self, op: Opcode) -> bool {
        *self == Instruction::Simple(op)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Jump(label) => write!(f, "JUMP {label}"),
            Instruction::TJump(label) => write!(f, "TJUMP {label}"),
            Instruction::Call(index) => write!(f, "CALL {index}"),
            Instruction::CallLib { library, function } => {
                write!(f, "CALL_LIB {library}.{function}")
            }
            Instruction::CallUrl {
                url,
                function,
                args,
            } => write!(f, "CALL_URL {url} {function} {args}"),
            Instruction::LoadVar(v) => write!(f, "LOAD_VAR {v}"),
            Instruction::StoreVar(v) => write!(f, "STORE_VAR {v}"),
            Instruction::IncrVar(v) => write!(f, "INCR_VAR {v}"),
            Instruction::LoadConst(c) => write!(f, "LOAD_CONST {c}"),
            Instruction::DecrVar(v) => write!(f, "DECR_VAR {v}"),
            Instruction::AddAsg(v) => write!(f, "ADD_ASG {v}"),
            Instruction::SubAsg(v) => write!(f, "SUB_ASG {v}"),
            Instruction::Simple(op) => f.write_str(op.mnemonic()),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    insn: Instruction,
    prev: Option<usize>,
    next: Option<usize>,
    live: bool,
}

#[derive(Debug, Clone, Default)]
struct LabelInfo {
    refs: u32,
    node: Option<usize>,
}

/// An editable list of symbolic instructions.
#[derive(Debug, Clone, Default)]
pub struct InstructionList {
    nodes: Vec<Node>,
    labels: Vec<LabelInfo>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl InstructionList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live instructions, labels included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the list holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // ========================================================================
    // Labels
    // ========================================================================

    /// Allocates a label that is not yet placed in the list.
    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(LabelInfo::default());
        LabelId(self.labels.len() - 1)
    }

    /// Appends `label` at the current end of the list.
    pub fn place_label(&mut self, label: LabelId) -> InsnId {
        self.push(Instruction::Label(label))
    }

    /// Number of branches referring to `label`.
    pub fn label_refs(&self, label: LabelId) -> u32 {
        self.labels.get(label.0).map_or(0, |info| info.refs)
    }

    /// Node holding `label`, if it has been placed.
    pub fn label_position(&self, label: LabelId) -> Option<InsnId> {
        self.labels
            .get(label.0)
            .and_then(|info| info.node)
            .map(InsnId)
    }

    fn retain_target(&mut self, insn: &Instruction) {
        if let Some(label) = insn.branch_target() {
            if let Some(info) = self.labels.get_mut(label.0) {
                info.refs += 1;
            }
        }
    }

    fn release_target(&mut self, insn: &Instruction) {
        if let Some(label) = insn.branch_target() {
            if let Some(info) = self.labels.get_mut(label.0) {
                debug_assert!(info.refs > 0, "{label} released more often than retained");
                info.refs = info.refs.saturating_sub(1);
            }
        }
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Appends an instruction.
    pub fn push(&mut self, insn: Instruction) -> InsnId {
        let index = self.nodes.len();
        self.retain_target(&insn);
        if let Instruction::Label(label) = insn {
            if let Some(info) = self.labels.get_mut(label.0) {
                debug_assert!(info.node.is_none(), "{label} placed twice");
                info.node = Some(index);
            }
        }

        self.nodes.push(Node {
            insn,
            prev: self.tail,
            next: None,
            live: true,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        InsnId(index)
    }

    /// Appends an operand-free opcode.
    pub fn emit(&mut self, op: Opcode) -> InsnId {
        self.push(Instruction::Simple(op))
    }

    /// Unlinks an instruction. Branches release their label reference.
    ///
    /// Removing a label that is still referenced is a defect.
    pub fn remove(&mut self, id: InsnId) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        if !node.live {
            return;
        }
        let (insn, prev, next) = (node.insn, node.prev, node.next);

        if let Instruction::Label(label) = insn {
            debug_assert_eq!(self.label_refs(label), 0, "removing referenced {label}");
            if let Some(info) = self.labels.get_mut(label.0) {
                info.node = None;
            }
        }
        self.release_target(&insn);

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[id.0];
        node.live = false;
        node.prev = None;
        node.next = None;
        self.len -= 1;
    }

    /// Replaces an instruction in place, moving label references.
    pub fn replace(&mut self, id: InsnId, insn: Instruction) {
        debug_assert!(!insn.is_label(), "labels cannot be introduced by replace");
        let Some(old) = self.get(id) else {
            return;
        };
        debug_assert!(!old.is_label(), "labels cannot be replaced");
        self.retain_target(&insn);
        self.release_target(&old);
        self.nodes[id.0].insn = insn;
    }

    /// Points a branch at a different label.
    pub fn retarget(&mut self, id: InsnId, label: LabelId) {
        let insn = match self.get(id) {
            Some(Instruction::Jump(_)) => Instruction::Jump(label),
            Some(Instruction::TJump(_)) => Instruction::TJump(label),
            _ => return,
        };
        self.replace(id, insn);
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// The instruction at `id`, if it is still in the list.
    pub fn get(&self, id: InsnId) -> Option<Instruction> {
        self.nodes
            .get(id.0)
            .filter(|node| node.live)
            .map(|node| node.insn)
    }

    /// First instruction.
    pub fn first(&self) -> Option<InsnId> {
        self.head.map(InsnId)
    }

    /// Last instruction.
    pub fn last(&self) -> Option<InsnId> {
        self.tail.map(InsnId)
    }

    /// Instruction after `id`.
    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.nodes.get(id.0).and_then(|node| node.next).map(InsnId)
    }

    /// Instruction before `id`.
    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        self.nodes.get(id.0).and_then(|node| node.prev).map(InsnId)
    }

    /// First instruction at or after `id` that is not a label.
    pub fn skip_labels(&self, mut id: Option<InsnId>) -> Option<InsnId> {
        while let Some(current) = id {
            match self.get(current) {
                Some(insn) if insn.is_label() => id = self.next(current),
                _ => return Some(current),
            }
        }
        None
    }

    /// Iterates over live instructions in order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Snapshot of the instructions in order.
    pub fn to_vec(&self) -> Vec<Instruction> {
        self.iter().map(|(_, insn)| insn).collect()
    }

    /// Symbolic assembler listing, one instruction per line.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (_, insn) in self.iter() {
            // Writing to a String cannot fail.
            let _ = match insn {
                Instruction::Label(_) => writeln!(out, "{insn}"),
                _ => writeln!(out, "    {insn}"),
            };
        }
        out
    }
}

/// Iterator over an [`InstructionList`].
pub struct Iter<'a> {
    list: &'a InstructionList,
    cursor: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = (InsnId, Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.list.nodes[index];
        self.cursor = node.next;
        Some((InsnId(index), node.insn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_iterate() {
        let mut list = InstructionList::new();
        list.emit(Opcode::Const1);
        list.push(Instruction::LoadVar(2));
        list.emit(Opcode::Add);
        assert_eq!(list.len(), 3);
        assert_eq!(
            list.to_vec(),
            vec![
                Instruction::Simple(Opcode::Const1),
                Instruction::LoadVar(2),
                Instruction::Simple(Opcode::Add),
            ]
        );
    }

    #[test]
    fn test_label_refcounts() {
        let mut list = InstructionList::new();
        let target = list.new_label();
        let other = list.new_label();
        let jump = list.push(Instruction::Jump(target));
        list.push(Instruction::TJump(target));
        assert_eq!(list.label_refs(target), 2);

        list.retarget(jump, other);
        assert_eq!(list.label_refs(target), 1);
        assert_eq!(list.label_refs(other), 1);

        list.remove(jump);
        assert_eq!(list.label_refs(other), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_relinks() {
        let mut list = InstructionList::new();
        let a = list.emit(Opcode::Const0);
        let b = list.emit(Opcode::Pop);
        let c = list.emit(Opcode::ReturnEs);

        list.remove(b);
        assert_eq!(list.next(a), Some(c));
        assert_eq!(list.prev(c), Some(a));
        assert_eq!(list.get(b), None);

        list.remove(a);
        list.remove(c);
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);

        // Removing twice is harmless.
        list.remove(a);
        assert!(list.is_empty());
    }

    #[test]
    fn test_skip_labels() {
        let mut list = InstructionList::new();
        let l1 = list.new_label();
        let l2 = list.new_label();
        let first = list.place_label(l1);
        list.place_label(l2);
        let ret = list.emit(Opcode::Return);
        assert_eq!(list.skip_labels(Some(first)), Some(ret));
        assert_eq!(list.skip_labels(list.next(ret)), None);
        assert_eq!(list.label_position(l2).and_then(|id| list.get(id)), Some(Instruction::Label(l2)));
    }

    #[test]
    fn test_listing() {
        let mut list = InstructionList::new();
        let end = list.new_label();
        list.push(Instruction::LoadVar(0));
        list.push(Instruction::TJump(end));
        list.push(Instruction::CallLib {
            library: 0,
            function: 3,
        });
        list.place_label(end);
        list.emit(Opcode::ReturnEs);
        assert_eq!(
            list.listing(),
            "    LOAD_VAR 0\n    TJUMP .L0\n    CALL_LIB 0.3\n.L0:\n    RETURN_ES\n"
        );
    }
}
