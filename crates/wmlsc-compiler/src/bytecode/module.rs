//! In-memory representation of a bytecode module.
//!
//! A module owns three pools. Constants are deduplicated on insertion and
//! their indices never move once handed out; pragmas and functions keep
//! insertion order, and a function's position is its call target.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of constants in a module.
pub const MAX_CONSTANTS: usize = 65_535;
/// Maximum number of pragmas in a module.
pub const MAX_PRAGMAS: usize = 65_535;
/// Maximum number of functions in a module.
pub const MAX_FUNCTIONS: usize = 255;

/// Character set used for string constants on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringEncoding {
    /// UTF-8 (MIBenum 106)
    #[default]
    Utf8,
    /// ISO-8859-1 (MIBenum 4)
    Latin1,
}

impl StringEncoding {
    /// IANA MIBenum written in the constant pool header.
    pub fn mib_enum(self) -> u32 {
        match self {
            StringEncoding::Utf8 => 106,
            StringEncoding::Latin1 => 4,
        }
    }

    /// Looks up an encoding by MIBenum.
    pub fn from_mib_enum(mib: u32) -> Option<Self> {
        match mib {
            106 => Some(StringEncoding::Utf8),
            4 => Some(StringEncoding::Latin1),
            _ => None,
        }
    }
}

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// 32-bit signed integer
    Integer(i32),
    /// Finite single-precision float
    Float(f32),
    /// Float NaN
    FloatNan,
    /// Float positive infinity
    FloatPositiveInfinity,
    /// Float negative infinity
    FloatNegativeInfinity,
    /// Non-empty string
    String(String),
    /// The empty string
    EmptyString,
}

impl Constant {
    /// Returns true for the two string kinds.
    pub fn is_string(&self) -> bool {
        matches!(self, Constant::String(_) | Constant::EmptyString)
    }

    /// The text of a string constant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(s) => Some(s),
            Constant::EmptyString => Some(""),
            _ => None,
        }
    }

    fn key(&self) -> ConstantKey {
        match self {
            Constant::Integer(v) => ConstantKey::Integer(*v),
            Constant::Float(v) => ConstantKey::Float(v.to_bits()),
            Constant::FloatNan => ConstantKey::FloatNan,
            Constant::FloatPositiveInfinity => ConstantKey::FloatPositiveInfinity,
            Constant::FloatNegativeInfinity => ConstantKey::FloatNegativeInfinity,
            Constant::String(s) => ConstantKey::String(s.clone()),
            Constant::EmptyString => ConstantKey::EmptyString,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Integer(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v:?}"),
            Constant::FloatNan => write!(f, "NaN"),
            Constant::FloatPositiveInfinity => write!(f, "Infinity"),
            Constant::FloatNegativeInfinity => write!(f, "-Infinity"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::EmptyString => write!(f, "\"\""),
        }
    }
}

/// Hashable identity of a constant. Floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Integer(i32),
    Float(u32),
    FloatNan,
    FloatPositiveInfinity,
    FloatNegativeInfinity,
    String(String),
    EmptyString,
}

/// A pragma pool entry. Every index refers to a string constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pragma {
    /// `use access domain`
    AccessDomain(u16),
    /// `use access path`
    AccessPath(u16),
    /// `use meta user agent name value`
    UserAgentProperty {
        /// Property name
        name: u16,
        /// Property value
        value: u16,
    },
    /// `use meta user agent name value scheme`
    UserAgentPropertyAndScheme {
        /// Property name
        name: u16,
        /// Property value
        value: u16,
        /// Scheme
        scheme: u16,
    },
}

impl Pragma {
    /// Type byte on the wire.
    pub fn kind(&self) -> u8 {
        match self {
            Pragma::AccessDomain(_) => 0,
            Pragma::AccessPath(_) => 1,
            Pragma::UserAgentProperty { .. } => 2,
            Pragma::UserAgentPropertyAndScheme { .. } => 3,
        }
    }

    /// Constant indices referenced by this pragma, in wire order.
    pub fn constant_indices(&self) -> Vec<u16> {
        match *self {
            Pragma::AccessDomain(c) | Pragma::AccessPath(c) => vec![c],
            Pragma::UserAgentProperty { name, value } => vec![name, value],
            Pragma::UserAgentPropertyAndScheme {
                name,
                value,
                scheme,
            } => vec![name, value, scheme],
        }
    }
}

/// A compiled function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Function {
    /// Number of arguments
    pub arguments: u8,
    /// Number of local variables, not counting arguments
    pub locals: u8,
    /// Finalized code bytes
    pub code: Vec<u8>,
    /// Exported name, present only for `extern` functions
    pub name: Option<String>,
}

/// Returns true if `name` may appear in the function name table.
pub fn is_valid_function_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 255 || bytes[0].is_ascii_digit() {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

/// A bytecode module under construction, or one read back from bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BytecodeModule {
    encoding: StringEncoding,
    constants: Vec<Constant>,
    constant_index: FxHashMap<ConstantKey, u16>,
    pragmas: Vec<Pragma>,
    functions: Vec<Function>,
    function_names: FxHashMap<String, u8>,
}

impl BytecodeModule {
    /// Creates an empty module.
    pub fn new(encoding: StringEncoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    /// Character set used when the module is encoded.
    pub fn string_encoding(&self) -> StringEncoding {
        self.encoding
    }

    // ========================================================================
    // Constants
    // ========================================================================

    /// Adds a constant, returning the index of an equal existing one if any.
    pub fn add_constant(&mut self, constant: Constant) -> Result<u16> {
        let key = constant.key();
        if let Some(&index) = self.constant_index.get(&key) {
            return Ok(index);
        }
        if self.constants.len() >= MAX_CONSTANTS {
            return Err(Error::TooManyConstants);
        }
        let index = self.constants.len() as u16;
        self.constants.push(constant);
        self.constant_index.insert(key, index);
        Ok(index)
    }

    /// Adds an integer constant.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add_constant(Constant::Integer(value))
    }

    /// Adds a float constant. NaN and the infinities get their own kinds.
    pub fn add_float(&mut self, value: f32) -> Result<u16> {
        let constant = if value.is_nan() {
            Constant::FloatNan
        } else if value == f32::INFINITY {
            Constant::FloatPositiveInfinity
        } else if value == f32::NEG_INFINITY {
            Constant::FloatNegativeInfinity
        } else {
            Constant::Float(value)
        };
        self.add_constant(constant)
    }

    /// Adds one of the special float kinds.
    pub fn add_float_special(&mut self, constant: Constant) -> Result<u16> {
        match constant {
            Constant::FloatNan
            | Constant::FloatPositiveInfinity
            | Constant::FloatNegativeInfinity => self.add_constant(constant),
            other => Err(Error::Internal(format!(
                "{other} is not a special float constant"
            ))),
        }
    }

    /// Adds a string constant. The empty string becomes [`Constant::EmptyString`].
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        if value.is_empty() {
            self.add_constant(Constant::EmptyString)
        } else {
            self.add_constant(Constant::String(value.to_string()))
        }
    }

    /// All constants in index order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// The constant at `index`.
    pub fn constant(&self, index: u16) -> Option<&Constant> {
        self.constants.get(usize::from(index))
    }

    /// Appends a constant without deduplication. Used by the decoder so that
    /// indices survive exactly as written.
    pub(crate) fn push_constant_raw(&mut self, constant: Constant) {
        let index = self.constants.len() as u16;
        self.constant_index.entry(constant.key()).or_insert(index);
        self.constants.push(constant);
    }

    // ========================================================================
    // Pragmas
    // ========================================================================

    /// Adds a pragma after checking that its indices name string constants.
    pub fn add_pragma(&mut self, pragma: Pragma) -> Result<u16> {
        for index in pragma.constant_indices() {
            match self.constant(index) {
                Some(constant) if constant.is_string() => {}
                _ => return Err(Error::InvalidPragma(index)),
            }
        }
        if self.pragmas.len() >= MAX_PRAGMAS {
            return Err(Error::TooManyPragmas);
        }
        self.pragmas.push(pragma);
        Ok((self.pragmas.len() - 1) as u16)
    }

    /// All pragmas in insertion order.
    pub fn pragmas(&self) -> &[Pragma] {
        &self.pragmas
    }

    pub(crate) fn push_pragma_raw(&mut self, pragma: Pragma) {
        self.pragmas.push(pragma);
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Adds a function, returning its index.
    pub fn add_function(&mut self, function: Function) -> Result<u8> {
        if let Some(name) = &function.name {
            if !is_valid_function_name(name) || self.function_names.contains_key(name) {
                return Err(Error::InvalidFunctionName(name.clone()));
            }
        }
        if self.functions.len() >= MAX_FUNCTIONS {
            return Err(Error::TooManyFunctions);
        }
        Ok(self.push_function_raw(function))
    }

    pub(crate) fn push_function_raw(&mut self, function: Function) -> u8 {
        let index = self.functions.len() as u8;
        if let Some(name) = &function.name {
            self.function_names.insert(name.clone(), index);
        }
        self.functions.push(function);
        index
    }

    /// All functions in index order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// The function at `index`.
    pub fn function(&self, index: u8) -> Option<&Function> {
        self.functions.get(usize::from(index))
    }

    /// Index of the function exported as `name`.
    pub fn function_index_by_name(&self, name: &str) -> Option<u8> {
        self.function_names.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_dedup() {
        let mut module = BytecodeModule::new(StringEncoding::Utf8);
        let a = module.add_integer(1000).unwrap();
        let b = module.add_string("hello").unwrap();
        let c = module.add_integer(1000).unwrap();
        let d = module.add_string("hello").unwrap();
        assert_eq!(a, c);
        assert_eq!(b, d);
        assert_eq!(module.constants().len(), 2);

        // Same bits as the integer, different kind.
        let e = module.add_float(1000.0).unwrap();
        assert_ne!(a, e);
    }

    #[test]
    fn test_float_dedup_by_bits() {
        let mut module = BytecodeModule::default();
        let zero = module.add_float(0.0).unwrap();
        let neg_zero = module.add_float(-0.0).unwrap();
        assert_ne!(zero, neg_zero);

        let nan = module.add_float(f32::NAN).unwrap();
        assert_eq!(module.add_float(-f32::NAN).unwrap(), nan);
        assert_eq!(module.constant(nan), Some(&Constant::FloatNan));

        let inf = module.add_float(f32::INFINITY).unwrap();
        assert_eq!(
            module.add_float_special(Constant::FloatPositiveInfinity).unwrap(),
            inf
        );
        assert!(module.add_float_special(Constant::Integer(1)).is_err());
    }

    #[test]
    fn test_empty_string_kind() {
        let mut module = BytecodeModule::default();
        let index = module.add_string("").unwrap();
        assert_eq!(module.constant(index), Some(&Constant::EmptyString));
        assert_eq!(module.constant(index).and_then(Constant::as_str), Some(""));
    }

    #[test]
    fn test_constant_pool_limit() {
        let mut module = BytecodeModule::default();
        for i in 0..MAX_CONSTANTS {
            module.add_integer(i as i32).unwrap();
        }
        assert!(matches!(
            module.add_integer(-5),
            Err(Error::TooManyConstants)
        ));
        // Existing values still resolve.
        assert_eq!(module.add_integer(7).unwrap(), 7);
    }

    #[test]
    fn test_pragma_requires_string_constants() {
        let mut module = BytecodeModule::default();
        let domain = module.add_string("example.com").unwrap();
        let number = module.add_integer(3).unwrap();

        assert_eq!(module.add_pragma(Pragma::AccessDomain(domain)).unwrap(), 0);
        assert!(matches!(
            module.add_pragma(Pragma::AccessPath(number)),
            Err(Error::InvalidPragma(1))
        ));
        assert!(matches!(
            module.add_pragma(Pragma::AccessPath(99)),
            Err(Error::InvalidPragma(99))
        ));
    }

    #[test]
    fn test_function_names() {
        assert!(is_valid_function_name("main"));
        assert!(is_valid_function_name("_x1"));
        assert!(!is_valid_function_name(""));
        assert!(!is_valid_function_name("1abc"));
        assert!(!is_valid_function_name("a-b"));
        assert!(!is_valid_function_name(&"a".repeat(256)));

        let mut module = BytecodeModule::default();
        let named = Function {
            name: Some("main".into()),
            ..Function::default()
        };
        assert_eq!(module.add_function(Function::default()).unwrap(), 0);
        assert_eq!(module.add_function(named.clone()).unwrap(), 1);
        assert_eq!(module.function_index_by_name("main"), Some(1));
        assert!(matches!(
            module.add_function(named),
            Err(Error::InvalidFunctionName(_))
        ));
    }

    #[test]
    fn test_function_pool_limit() {
        let mut module = BytecodeModule::default();
        for _ in 0..MAX_FUNCTIONS {
            module.add_function(Function::default()).unwrap();
        }
        assert!(matches!(
            module.add_function(Function::default()),
            Err(Error::TooManyFunctions)
        ));
    }
}
