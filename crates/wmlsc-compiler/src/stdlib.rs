//! Standard library lookup.
//!
//! Library calls are compiled to a pair of numbers: the library index and
//! the function index within that library. The compiler only needs the
//! mapping from names to those numbers and each function's arity, which a
//! [`LibraryRegistry`] provides. [`StandardLibrary`] is the WMLScript 1.1
//! table.

/// A library function as seen by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryFunction {
    /// Library index
    pub library: u16,
    /// Function index within the library
    pub function: u8,
    /// Number of arguments
    pub arity: u8,
}

/// Why a library call could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    /// No library with that name
    UnknownLibrary,
    /// The library exists but has no such function
    UnknownFunction,
}

/// Name-to-index mapping for callable libraries.
pub trait LibraryRegistry {
    /// Resolves `library.function`.
    fn resolve(&self, library: &str, function: &str) -> Result<LibraryFunction, LookupError>;

    /// Names for a library/function index pair, used by the disassembler.
    fn name_of(&self, library: u16, function: u8) -> Option<(&str, &str)>;
}

struct Library {
    name: &'static str,
    index: u16,
    functions: &'static [(&'static str, u8, u8)],
}

// (name, function index, arity)
static LIBRARIES: &[Library] = &[
    Library {
        name: "Lang",
        index: 0,
        functions: &[
            ("abs", 0, 1),
            ("min", 1, 2),
            ("max", 2, 2),
            ("parseInt", 3, 1),
            ("parseFloat", 4, 1),
            ("isInt", 5, 1),
            ("isFloat", 6, 1),
            ("maxInt", 7, 0),
            ("minInt", 8, 0),
            ("float", 9, 0),
            ("exit", 10, 1),
            ("abort", 11, 1),
            ("random", 12, 1),
            ("seed", 13, 1),
            ("characterSet", 14, 0),
        ],
    },
    Library {
        name: "Float",
        index: 1,
        functions: &[
            ("int", 0, 1),
            ("floor", 1, 1),
            ("ceil", 2, 1),
            ("pow", 3, 2),
            ("round", 4, 1),
            ("sqrt", 5, 1),
            ("maxFloat", 6, 0),
            ("minFloat", 7, 0),
        ],
    },
    Library {
        name: "String",
        index: 2,
        functions: &[
            ("length", 0, 1),
            ("isEmpty", 1, 1),
            ("charAt", 2, 2),
            ("subString", 3, 3),
            ("find", 4, 2),
            ("replace", 5, 3),
            ("elements", 6, 2),
            ("elementAt", 7, 3),
            ("removeAt", 8, 3),
            ("replaceAt", 9, 4),
            ("insertAt", 10, 4),
            ("squeeze", 11, 1),
            ("trim", 12, 1),
            ("compare", 13, 2),
            ("toString", 14, 1),
            ("format", 15, 2),
        ],
    },
    Library {
        name: "URL",
        index: 3,
        functions: &[
            ("isValid", 0, 1),
            ("getScheme", 1, 1),
            ("getHost", 2, 1),
            ("getPort", 3, 1),
            ("getPath", 4, 1),
            ("getParameters", 5, 1),
            ("getQuery", 6, 1),
            ("getFragment", 7, 1),
            ("getBase", 8, 0),
            ("getReferer", 9, 0),
            ("resolve", 10, 2),
            ("escapeString", 11, 1),
            ("unescapeString", 12, 1),
            ("loadString", 13, 2),
        ],
    },
    Library {
        name: "WMLBrowser",
        index: 4,
        functions: &[
            ("getVar", 0, 1),
            ("setVar", 1, 2),
            ("go", 2, 1),
            ("prev", 3, 0),
            ("newContext", 4, 0),
            ("getCurrentCard", 5, 0),
            ("refresh", 6, 0),
        ],
    },
    Library {
        name: "Dialogs",
        index: 5,
        functions: &[("prompt", 0, 2), ("confirm", 1, 3), ("alert", 2, 1)],
    },
    Library {
        name: "Crypto",
        index: 6,
        functions: &[("signText", 16, 4)],
    },
];

/// The WMLScript 1.1 standard libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLibrary;

impl LibraryRegistry for StandardLibrary {
    fn resolve(&self, library: &str, function: &str) -> Result<LibraryFunction, LookupError> {
        let lib = LIBRARIES
            .iter()
            .find(|lib| lib.name == library)
            .ok_or(LookupError::UnknownLibrary)?;
        lib.functions
            .iter()
            .find(|(name, _, _)| *name == function)
            .map(|&(_, index, arity)| LibraryFunction {
                library: lib.index,
                function: index,
                arity,
            })
            .ok_or(LookupError::UnknownFunction)
    }

    fn name_of(&self, library: u16, function: u8) -> Option<(&str, &str)> {
        let lib = LIBRARIES.iter().find(|lib| lib.index == library)?;
        lib.functions
            .iter()
            .find(|(_, index, _)| *index == function)
            .map(|(name, _, _)| (lib.name, *name))
    }
}
