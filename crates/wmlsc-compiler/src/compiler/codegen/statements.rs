//! Statement compilation.
//!
//! ## Control Flow Compilation
//!
//! ```text
//! if (c) t else e         while (c) body          for (i; c; u) body
//!
//!   [c]                   .cont:                    [i]
//!   TJUMP .else             [c]                   .loop:
//!   [t]                     TJUMP .break            [c]
//!   JUMP .end               [body]                  TJUMP .break
//! .else:                    JUMP .cont              [body]
//!   [e]                   .break:                 .cont:
//! .end:                                             [u] POP
//!                                                   JUMP .loop
//!                                                 .break:
//! ```
//!
//! `break` and `continue` jump to the labels of the innermost loop. The
//! redundant jumps this scheme produces are left for the optimizer.

use crate::ast::*;
use crate::compiler::asm::Instruction;
use crate::compiler::opcode::Opcode;
use crate::error::DiagnosticKind;

use super::{FunctionCodegen, LoopLabels};

impl FunctionCodegen<'_, '_> {
    /// Compiles a statement.
    pub(super) fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block(block) => {
                for stmt in &block.body {
                    self.statement(stmt);
                }
            }
            Statement::VariableDeclaration(decl) => self.variable_declaration(decl),
            Statement::Expression(expr) => {
                self.expression(&expr.expression);
                self.code.emit(Opcode::Pop);
            }
            Statement::If(if_stmt) => self.if_statement(if_stmt),
            Statement::While(while_stmt) => self.while_statement(while_stmt),
            Statement::For(for_stmt) => self.for_statement(for_stmt),
            Statement::Return(ret) => match &ret.argument {
                Some(value) => {
                    self.expression(value);
                    self.code.emit(Opcode::Return);
                }
                None => {
                    self.code.emit(Opcode::ReturnEs);
                }
            },
            Statement::Break(jump) => match self.loops.last() {
                Some(labels) => {
                    let target = labels.break_label;
                    self.code.push(Instruction::Jump(target));
                }
                None => self
                    .ctx
                    .error(jump.line, DiagnosticKind::NotWithinLoop("break")),
            },
            Statement::Continue(jump) => match self.loops.last() {
                Some(labels) => {
                    let target = labels.continue_label;
                    self.code.push(Instruction::Jump(target));
                }
                None => self
                    .ctx
                    .error(jump.line, DiagnosticKind::NotWithinLoop("continue")),
            },
            Statement::Empty => {}
        }
    }

    fn variable_declaration(&mut self, decl: &VariableDeclaration) {
        for declarator in &decl.declarations {
            let id = &declarator.id;
            let slot = self.declare(&id.name, id.line);
            if let Some(init) = &declarator.init {
                self.expression(init);
                if let Some(slot) = slot {
                    self.code.push(Instruction::StoreVar(slot));
                }
            }
        }
    }

    fn if_statement(&mut self, stmt: &IfStatement) {
        let else_label = self.code.new_label();
        let end_label = self.code.new_label();

        self.expression(&stmt.test);
        self.code.push(Instruction::TJump(else_label));
        self.statement(&stmt.consequent);
        self.code.push(Instruction::Jump(end_label));
        self.code.place_label(else_label);
        if let Some(alternate) = &stmt.alternate {
            self.statement(alternate);
        }
        self.code.place_label(end_label);
    }

    fn while_statement(&mut self, stmt: &WhileStatement) {
        let labels = LoopLabels {
            continue_label: self.code.new_label(),
            break_label: self.code.new_label(),
        };

        self.code.place_label(labels.continue_label);
        self.expression(&stmt.test);
        self.code.push(Instruction::TJump(labels.break_label));
        self.loop_body(labels, &stmt.body);
        self.code.push(Instruction::Jump(labels.continue_label));
        self.code.place_label(labels.break_label);
    }

    fn for_statement(&mut self, stmt: &ForStatement) {
        match &stmt.init {
            Some(ForInit::Declaration(decl)) => self.variable_declaration(decl),
            Some(ForInit::Expression(expr)) => {
                self.expression(expr);
                self.code.emit(Opcode::Pop);
            }
            None => {}
        }

        let loop_label = self.code.new_label();
        let labels = LoopLabels {
            continue_label: self.code.new_label(),
            break_label: self.code.new_label(),
        };

        self.code.place_label(loop_label);
        if let Some(test) = &stmt.test {
            self.expression(test);
            self.code.push(Instruction::TJump(labels.break_label));
        }
        self.loop_body(labels, &stmt.body);
        self.code.place_label(labels.continue_label);
        if let Some(update) = &stmt.update {
            self.expression(update);
            self.code.emit(Opcode::Pop);
        }
        self.code.push(Instruction::Jump(loop_label));
        self.code.place_label(labels.break_label);
    }

    fn loop_body(&mut self, labels: LoopLabels, body: &Statement) {
        self.loops.push(labels);
        self.statement(body);
        self.loops.pop();
    }
}
