//! Expression compilation.
//!
//! Every expression leaves exactly one value on the operand stack.
//!
//! | Expression | Code |
//! |------------|------|
//! | `a = e` | `e STORE_VAR a LOAD_VAR a` |
//! | `a += e` | `e ADD_ASG a LOAD_VAR a` |
//! | `a *= e` | `LOAD_VAR a e MUL STORE_VAR a LOAD_VAR a` |
//! | `c ? t : e` | `c TJUMP .else t JUMP .end .else: e .end:` |
//! | `l && r` | `l SCAND TJUMP .skip r TOBOOL .skip:` |
//! | `++a` | `INCR_VAR a LOAD_VAR a` |
//! | `a++` | `LOAD_VAR a INCR_VAR a` |

use crate::ast::*;
use crate::bytecode::ieee754::{self, FloatClass};
use crate::compiler::asm::Instruction;
use crate::compiler::opcode::Opcode;
use crate::error::DiagnosticKind;
use crate::stdlib::LookupError;

use super::FunctionCodegen;

impl FunctionCodegen<'_, '_> {
    /// Compiles an expression.
    pub(super) fn expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Literal(literal) => self.literal(&literal.value, literal.line),
            Expression::Identifier(id) => {
                if let Some(slot) = self.resolve(&id.name, id.line) {
                    self.code.push(Instruction::LoadVar(slot));
                }
            }
            Expression::Sequence(seq) => self.sequence(seq),
            Expression::Assignment(assign) => self.assignment(assign),
            Expression::Conditional(cond) => self.conditional(cond),
            Expression::Binary(bin) => self.binary(bin),
            Expression::Unary(unary) => {
                self.expression(&unary.argument);
                self.code.emit(unary_opcode(unary.operator));
            }
            Expression::Update(update) => self.update(update),
            Expression::Call(call) => self.call(call),
        }
    }

    // ========================================================================
    // Literals
    // ========================================================================

    fn literal(&mut self, value: &Literal, line: u32) {
        match value {
            Literal::Integer(v) => self.integer(*v, line),
            Literal::Float(v) => self.float(*v, line),
            Literal::String(s) if s.is_empty() => {
                self.code.emit(Opcode::ConstEs);
            }
            Literal::String(s) => {
                let index = self.ctx.module.add_string(s);
                self.load_constant(index, line);
            }
            Literal::Boolean(true) => {
                self.code.emit(Opcode::ConstTrue);
            }
            Literal::Boolean(false) => {
                self.code.emit(Opcode::ConstFalse);
            }
            Literal::Invalid => {
                self.code.emit(Opcode::ConstInvalid);
            }
        }
    }

    fn integer(&mut self, value: i64, line: u32) {
        let value = match i32::try_from(value) {
            Ok(v) => v,
            Err(_) => {
                let saturated = if value < 0 { i32::MIN } else { i32::MAX };
                self.ctx.warning(
                    line,
                    DiagnosticKind::EncodingOverflow(format!(
                        "integer literal {value} does not fit in 32 bits, using {saturated}"
                    )),
                );
                saturated
            }
        };

        match value {
            0 => {
                self.code.emit(Opcode::Const0);
            }
            1 => {
                self.code.emit(Opcode::Const1);
            }
            -1 => {
                self.code.emit(Opcode::ConstM1);
            }
            _ => {
                let index = self.ctx.module.add_integer(value);
                self.load_constant(index, line);
            }
        }
    }

    fn float(&mut self, value: f64, line: u32) {
        let encoded = ieee754::encode_single(value);
        let overflowed = value.is_finite()
            && matches!(
                encoded.class,
                FloatClass::PositiveInfinity | FloatClass::NegativeInfinity
            );
        if overflowed {
            self.ctx.warning(
                line,
                DiagnosticKind::EncodingOverflow(format!(
                    "floating point literal {value} is too large, using infinity"
                )),
            );
        }

        let single = f32::from_bits(u32::from_be_bytes(encoded.bytes));
        let index = self.ctx.module.add_float(single);
        self.load_constant(index, line);
    }

    fn load_constant(&mut self, index: crate::Result<u16>, line: u32) {
        match index {
            Ok(index) => {
                self.code.push(Instruction::LoadConst(index));
            }
            Err(_) => self.ctx.error(line, DiagnosticKind::TooManyConstants),
        }
    }

    // ========================================================================
    // Compound expressions
    // ========================================================================

    fn sequence(&mut self, seq: &SequenceExpression) {
        let Some((last, rest)) = seq.expressions.split_last() else {
            return;
        };
        for expr in rest {
            self.expression(expr);
            self.code.emit(Opcode::Pop);
        }
        self.expression(last);
    }

    fn assignment(&mut self, assign: &AssignmentExpression) {
        let target = &assign.target;
        let slot = self.resolve(&target.name, target.line);

        match assign.operator {
            AssignmentOperator::Assign => {
                self.expression(&assign.value);
                if let Some(slot) = slot {
                    self.code.push(Instruction::StoreVar(slot));
                }
            }
            AssignmentOperator::AddAssign => {
                self.expression(&assign.value);
                if let Some(slot) = slot {
                    self.code.push(Instruction::AddAsg(slot));
                }
            }
            AssignmentOperator::SubtractAssign => {
                self.expression(&assign.value);
                if let Some(slot) = slot {
                    self.code.push(Instruction::SubAsg(slot));
                }
            }
            operator => {
                if let Some(slot) = slot {
                    self.code.push(Instruction::LoadVar(slot));
                }
                self.expression(&assign.value);
                if let Some(op) = operator.binary_operator() {
                    self.code.emit(binary_opcode(op));
                }
                if let Some(slot) = slot {
                    self.code.push(Instruction::StoreVar(slot));
                }
            }
        }

        if let Some(slot) = slot {
            self.code.push(Instruction::LoadVar(slot));
        }
    }

    fn conditional(&mut self, cond: &ConditionalExpression) {
        let else_label = self.code.new_label();
        let end_label = self.code.new_label();

        self.expression(&cond.test);
        self.code.push(Instruction::TJump(else_label));
        self.expression(&cond.consequent);
        self.code.push(Instruction::Jump(end_label));
        self.code.place_label(else_label);
        self.expression(&cond.alternate);
        self.code.place_label(end_label);
    }

    fn binary(&mut self, bin: &BinaryExpression) {
        let short_circuit = match bin.operator {
            BinaryOperator::LogicalAnd => Some(Opcode::ScAnd),
            BinaryOperator::LogicalOr => Some(Opcode::ScOr),
            _ => None,
        };

        match short_circuit {
            Some(op) => {
                let skip = self.code.new_label();
                self.expression(&bin.left);
                self.code.emit(op);
                self.code.push(Instruction::TJump(skip));
                self.expression(&bin.right);
                self.code.emit(Opcode::ToBool);
                self.code.place_label(skip);
            }
            None => {
                self.expression(&bin.left);
                self.expression(&bin.right);
                self.code.emit(binary_opcode(bin.operator));
            }
        }
    }

    fn update(&mut self, update: &UpdateExpression) {
        let target = &update.target;
        let Some(slot) = self.resolve(&target.name, target.line) else {
            return;
        };

        let mutate = match update.operator {
            UpdateOperator::Increment => Instruction::IncrVar(slot),
            UpdateOperator::Decrement => Instruction::DecrVar(slot),
        };
        if update.prefix {
            self.code.push(mutate);
            self.code.push(Instruction::LoadVar(slot));
        } else {
            self.code.push(Instruction::LoadVar(slot));
            self.code.push(mutate);
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn call(&mut self, call: &CallExpression) {
        for arg in &call.arguments {
            self.expression(arg);
        }
        let argc = call.arguments.len();

        match &call.callee {
            Callee::Local { name } => {
                let Some(signature) = self.ctx.functions.get(name).copied() else {
                    self.ctx
                        .error(call.line, DiagnosticKind::UnknownFunction(name.clone()));
                    return;
                };
                if self.check_arity(name, signature.params, argc, call.line) {
                    self.code.push(Instruction::Call(signature.index));
                }
            }
            Callee::Library { library, function } => {
                let resolved = match self.ctx.registry.resolve(library, function) {
                    Ok(resolved) => resolved,
                    Err(LookupError::UnknownLibrary) => {
                        self.ctx
                            .error(call.line, DiagnosticKind::UnknownLibrary(library.clone()));
                        return;
                    }
                    Err(LookupError::UnknownFunction) => {
                        self.ctx.error(
                            call.line,
                            DiagnosticKind::UnknownLibraryFunction {
                                library: library.clone(),
                                function: function.clone(),
                            },
                        );
                        return;
                    }
                };
                let callee = format!("{library}.{function}");
                if self.check_arity(&callee, usize::from(resolved.arity), argc, call.line) {
                    self.code.push(Instruction::CallLib {
                        library: resolved.library,
                        function: resolved.function,
                    });
                }
            }
            Callee::External { unit, function } => {
                let Some(external) = self.ctx.externals.get(unit).copied() else {
                    self.ctx
                        .error(call.line, DiagnosticKind::UnknownExternalUnit(unit.clone()));
                    return;
                };
                let Ok(args) = u8::try_from(argc) else {
                    self.ctx.error(
                        call.line,
                        DiagnosticKind::ArityMismatch {
                            callee: format!("{unit}#{function}"),
                            expected: usize::from(u8::MAX),
                            got: argc,
                        },
                    );
                    return;
                };
                match self.ctx.module.add_string(function) {
                    Ok(name) => {
                        self.code.push(Instruction::CallUrl {
                            url: external.url,
                            function: name,
                            args,
                        });
                    }
                    Err(_) => self.ctx.error(call.line, DiagnosticKind::TooManyConstants),
                }
            }
        }
    }

    fn check_arity(&mut self, callee: &str, expected: usize, got: usize, line: u32) -> bool {
        if expected == got {
            return true;
        }
        self.ctx.error(
            line,
            DiagnosticKind::ArityMismatch {
                callee: callee.to_string(),
                expected,
                got,
            },
        );
        false
    }
}

fn binary_opcode(op: BinaryOperator) -> Opcode {
    match op {
        BinaryOperator::Add => Opcode::Add,
        BinaryOperator::Subtract => Opcode::Sub,
        BinaryOperator::Multiply => Opcode::Mul,
        BinaryOperator::Divide => Opcode::Div,
        BinaryOperator::IntegerDivide => Opcode::IDiv,
        BinaryOperator::Remainder => Opcode::Rem,
        BinaryOperator::BitwiseAnd => Opcode::BAnd,
        BinaryOperator::BitwiseOr => Opcode::BOr,
        BinaryOperator::BitwiseXor => Opcode::BXor,
        BinaryOperator::LeftShift => Opcode::BLShift,
        BinaryOperator::SignedRightShift => Opcode::BRsShift,
        BinaryOperator::UnsignedRightShift => Opcode::BRszShift,
        BinaryOperator::Equal => Opcode::Eq,
        BinaryOperator::NotEqual => Opcode::Ne,
        BinaryOperator::LessThan => Opcode::Lt,
        BinaryOperator::LessThanOrEqual => Opcode::Le,
        BinaryOperator::GreaterThan => Opcode::Gt,
        BinaryOperator::GreaterThanOrEqual => Opcode::Ge,
        // Short-circuit forms never reach here.
        BinaryOperator::LogicalAnd => Opcode::ScAnd,
        BinaryOperator::LogicalOr => Opcode::ScOr,
    }
}

fn unary_opcode(op: UnaryOperator) -> Opcode {
    match op {
        UnaryOperator::Minus => Opcode::UMinus,
        UnaryOperator::LogicalNot => Opcode::Not,
        UnaryOperator::BitwiseNot => Opcode::BNot,
        UnaryOperator::Typeof => Opcode::TypeOf,
        UnaryOperator::IsValid => Opcode::IsValid,
    }
}
