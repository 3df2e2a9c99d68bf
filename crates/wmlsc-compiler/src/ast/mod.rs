//! Abstract Syntax Tree (AST) definitions for WMLScript.
//!
//! The tree is produced by a front end and handed to the compiler fully
//! built. Every type derives serde so a front end in another process can
//! ship it as JSON:
//!
//! ```json
//! { "type": "binary", "operator": "add",
//!   "left":  { "type": "identifier", "name": "a", "line": 1 },
//!   "right": { "type": "literal", "value": { "integer": 1 }, "line": 1 } }
//! ```
//!
//! Nodes that can be the subject of a diagnostic carry a 1-based source line.

use serde::{Deserialize, Serialize};

/// A complete compilation unit: pragmas followed by function declarations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// Module-level `use` declarations, in source order
    #[serde(default)]
    pub pragmas: Vec<Pragma>,
    /// The functions, in source order
    #[serde(default)]
    pub functions: Vec<FunctionDeclaration>,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

// ============================================================================
// Pragmas
// ============================================================================

/// A `use` pragma.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pragma {
    /// `use url NAME "url";`
    Url(UrlPragma),
    /// `use access domain "d" path "p";`
    Access(AccessPragma),
    /// `use meta ...;`
    Meta(MetaPragma),
}

/// Declares an external compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlPragma {
    /// Name used in `name#function()` calls
    pub name: String,
    /// Location of the unit
    pub url: String,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

/// Access control for the unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPragma {
    /// Allowed referring domain
    #[serde(default)]
    pub domain: Option<String>,
    /// Allowed referring path
    #[serde(default)]
    pub path: Option<String>,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

/// Which kind of meta information a pragma carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaProperty {
    /// `use meta name`
    Name,
    /// `use meta http equiv`
    HttpEquiv,
    /// `use meta user agent`
    UserAgent,
}

/// A meta pragma.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaPragma {
    /// Kind of meta information
    pub property: MetaProperty,
    /// Property name
    pub name: String,
    /// Property value
    pub content: String,
    /// Optional scheme
    #[serde(default)]
    pub scheme: Option<String>,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

// ============================================================================
// Functions and statements
// ============================================================================

/// A function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// The function name
    pub name: String,
    /// Whether the function is exported (`extern`)
    #[serde(default)]
    pub is_extern: bool,
    /// The parameters
    #[serde(default)]
    pub params: Vec<Identifier>,
    /// The function body
    #[serde(default)]
    pub body: Vec<Statement>,
    /// Source line of the declaration
    #[serde(default)]
    pub line: u32,
}

/// A WMLScript statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    /// Block statement { ... }
    Block(BlockStatement),
    /// `var` declaration
    VariableDeclaration(VariableDeclaration),
    /// Expression statement
    Expression(ExpressionStatement),
    /// If statement
    If(IfStatement),
    /// While statement
    While(WhileStatement),
    /// For statement
    For(ForStatement),
    /// Return statement
    Return(ReturnStatement),
    /// Break statement
    Break(JumpStatement),
    /// Continue statement
    Continue(JumpStatement),
    /// Empty statement (;)
    Empty,
}

/// A block statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockStatement {
    /// The statements in the block
    pub body: Vec<Statement>,
}

/// A variable declaration statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    /// The declarators
    pub declarations: Vec<VariableDeclarator>,
}

/// A single variable declarator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclarator {
    /// The identifier being declared
    pub id: Identifier,
    /// Optional initializer expression
    #[serde(default)]
    pub init: Option<Expression>,
}

/// An expression statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    /// The expression
    pub expression: Expression,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    /// The condition
    pub test: Expression,
    /// The then branch
    pub consequent: Box<Statement>,
    /// The optional else branch
    #[serde(default)]
    pub alternate: Option<Box<Statement>>,
}

/// A while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStatement {
    /// The condition
    pub test: Expression,
    /// The body
    pub body: Box<Statement>,
}

/// A for statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    /// Initialization
    #[serde(default)]
    pub init: Option<ForInit>,
    /// Condition
    #[serde(default)]
    pub test: Option<Expression>,
    /// Update expression
    #[serde(default)]
    pub update: Option<Expression>,
    /// The body
    pub body: Box<Statement>,
}

/// For loop initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForInit {
    /// `for (var i = 0; ...)`
    Declaration(VariableDeclaration),
    /// `for (i = 0; ...)`
    Expression(Expression),
}

/// A return statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    /// The returned value
    #[serde(default)]
    pub argument: Option<Expression>,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

/// `break` or `continue`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JumpStatement {
    /// Source line
    #[serde(default)]
    pub line: u32,
}

// ============================================================================
// Expressions
// ============================================================================

/// A WMLScript expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    /// Literal value
    Literal(LiteralExpression),
    /// Variable reference
    Identifier(Identifier),
    /// Comma-separated expressions
    Sequence(SequenceExpression),
    /// Assignment
    Assignment(AssignmentExpression),
    /// `test ? consequent : alternate`
    Conditional(ConditionalExpression),
    /// Binary operation, including `&&` and `||`
    Binary(BinaryExpression),
    /// Unary operation
    Unary(UnaryExpression),
    /// `++x`, `x--` and friends
    Update(UpdateExpression),
    /// Function call
    Call(CallExpression),
}

/// A literal with its source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralExpression {
    /// The value
    pub value: Literal,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

/// A literal value.
///
/// Integer literals are kept wide so that out-of-range values reach the
/// compiler and can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// Integer literal
    Integer(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal
    String(String),
    /// `true` or `false`
    Boolean(bool),
    /// `invalid`
    Invalid,
}

/// Comma expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExpression {
    /// The expressions, evaluated left to right
    pub expressions: Vec<Expression>,
}

/// An assignment expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentExpression {
    /// The operator
    pub operator: AssignmentOperator,
    /// The assigned variable
    pub target: Identifier,
    /// The right-hand side
    pub value: Box<Expression>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOperator {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubtractAssign,
    /// `*=`
    MultiplyAssign,
    /// `/=`
    DivideAssign,
    /// `div=`
    IntegerDivideAssign,
    /// `%=`
    RemainderAssign,
    /// `&=`
    BitwiseAndAssign,
    /// `|=`
    BitwiseOrAssign,
    /// `^=`
    BitwiseXorAssign,
    /// `<<=`
    LeftShiftAssign,
    /// `>>=`
    SignedRightShiftAssign,
    /// `>>>=`
    UnsignedRightShiftAssign,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment applies.
    pub fn binary_operator(self) -> Option<BinaryOperator> {
        use AssignmentOperator::*;
        Some(match self {
            Assign => return None,
            AddAssign => BinaryOperator::Add,
            SubtractAssign => BinaryOperator::Subtract,
            MultiplyAssign => BinaryOperator::Multiply,
            DivideAssign => BinaryOperator::Divide,
            IntegerDivideAssign => BinaryOperator::IntegerDivide,
            RemainderAssign => BinaryOperator::Remainder,
            BitwiseAndAssign => BinaryOperator::BitwiseAnd,
            BitwiseOrAssign => BinaryOperator::BitwiseOr,
            BitwiseXorAssign => BinaryOperator::BitwiseXor,
            LeftShiftAssign => BinaryOperator::LeftShift,
            SignedRightShiftAssign => BinaryOperator::SignedRightShift,
            UnsignedRightShiftAssign => BinaryOperator::UnsignedRightShift,
        })
    }
}

/// A conditional (ternary) expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpression {
    /// The condition
    pub test: Box<Expression>,
    /// Value when true
    pub consequent: Box<Expression>,
    /// Value when false
    pub alternate: Box<Expression>,
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    /// The operator
    pub operator: BinaryOperator,
    /// Left operand
    pub left: Box<Expression>,
    /// Right operand
    pub right: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Remainder,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    SignedRightShift,
    UnsignedRightShift,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LogicalAnd,
    LogicalOr,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    /// The operator
    pub operator: UnaryOperator,
    /// The operand
    pub argument: Box<Expression>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    /// `-`
    Minus,
    /// `!`
    LogicalNot,
    /// `~`
    BitwiseNot,
    /// `typeof`
    Typeof,
    /// `isvalid`
    IsValid,
}

/// An update expression (`++`/`--`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateExpression {
    /// The operator
    pub operator: UpdateOperator,
    /// `++x` rather than `x++`
    pub prefix: bool,
    /// The updated variable
    pub target: Identifier,
}

/// Update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperator {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

/// A function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpression {
    /// Who is called
    pub callee: Callee,
    /// The arguments
    #[serde(default)]
    pub arguments: Vec<Expression>,
    /// Source line
    #[serde(default)]
    pub line: u32,
}

/// The three call forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Callee {
    /// `f()`, a function of this unit
    Local {
        /// Function name
        name: String,
    },
    /// `Lang.abs()`, a standard library function
    Library {
        /// Library name
        library: String,
        /// Function name
        function: String,
    },
    /// `other#f()`, a function of a unit declared with `use url`
    External {
        /// Name from the `use url` pragma
        unit: String,
        /// Function name
        function: String,
    },
}

// ============================================================================
// Construction helpers
// ============================================================================

impl Identifier {
    /// Creates an identifier.
    pub fn new(name: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            line,
        }
    }
}

impl Expression {
    /// Literal expression.
    pub fn literal(value: Literal, line: u32) -> Self {
        Expression::Literal(LiteralExpression { value, line })
    }

    /// Integer literal.
    pub fn integer(value: i64) -> Self {
        Self::literal(Literal::Integer(value), 0)
    }

    /// String literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::String(value.into()), 0)
    }

    /// Variable reference.
    pub fn identifier(name: impl Into<String>, line: u32) -> Self {
        Expression::Identifier(Identifier::new(name, line))
    }

    /// Binary expression.
    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary(BinaryExpression {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Unary expression.
    pub fn unary(operator: UnaryOperator, argument: Expression) -> Self {
        Expression::Unary(UnaryExpression {
            operator,
            argument: Box::new(argument),
        })
    }

    /// Assignment expression.
    pub fn assign(operator: AssignmentOperator, target: Identifier, value: Expression) -> Self {
        Expression::Assignment(AssignmentExpression {
            operator,
            target,
            value: Box::new(value),
        })
    }

    /// Call expression.
    pub fn call(callee: Callee, arguments: Vec<Expression>, line: u32) -> Self {
        Expression::Call(CallExpression {
            callee,
            arguments,
            line,
        })
    }
}

impl Statement {
    /// Expression statement.
    pub fn expression(expression: Expression) -> Self {
        Statement::Expression(ExpressionStatement { expression })
    }

    /// `return value;` or `return;`.
    pub fn ret(argument: Option<Expression>, line: u32) -> Self {
        Statement::Return(ReturnStatement { argument, line })
    }

    /// `var name = init;`
    pub fn var(id: Identifier, init: Option<Expression>) -> Self {
        Statement::VariableDeclaration(VariableDeclaration {
            declarations: vec![VariableDeclarator { id, init }],
        })
    }

    /// Block of statements.
    pub fn block(body: Vec<Statement>) -> Self {
        Statement::Block(BlockStatement { body })
    }
}
