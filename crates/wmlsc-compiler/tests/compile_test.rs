//! End-to-end compilation tests.
//!
//! Units are written as JSON, the same form the command-line driver reads.

use wmlsc_compiler::ast::CompilationUnit;
use wmlsc_compiler::compiler::disasm::{DecodedOperand, disassemble};
use wmlsc_compiler::{
    CompiledUnit, Compiler, CompilerOptions, DiagnosticKind, Error, OptimizerOptions, Severity,
    decode,
};

fn unit(json: &str) -> CompilationUnit {
    serde_json::from_str(json).expect("valid unit")
}

fn compile(json: &str) -> CompiledUnit {
    Compiler::new(CompilerOptions::default())
        .compile(&unit(json))
        .expect("compilation succeeds")
}

const ADD_ONE: &str = r#"{
    "functions": [{
        "name": "f",
        "is_extern": true,
        "params": [{ "name": "a", "line": 1 }],
        "body": [{
            "type": "return",
            "line": 1,
            "argument": {
                "type": "binary",
                "operator": "add",
                "left": { "type": "identifier", "name": "a", "line": 1 },
                "right": { "type": "literal", "value": { "integer": 1 }, "line": 1 }
            }
        }],
        "line": 1
    }]
}"#;

const COUNT: &str = r#"{
    "functions": [{
        "name": "count",
        "is_extern": true,
        "params": [{ "name": "n", "line": 1 }],
        "body": [
            { "type": "variable_declaration", "declarations": [
                { "id": { "name": "i", "line": 2 }, "init": { "type": "literal", "value": { "integer": 0 } } }
            ] },
            { "type": "while",
              "test": {
                  "type": "binary", "operator": "less_than",
                  "left": { "type": "identifier", "name": "i" },
                  "right": { "type": "identifier", "name": "n" }
              },
              "body": { "type": "expression", "expression": {
                  "type": "update", "operator": "increment", "prefix": false,
                  "target": { "name": "i" }
              } }
            },
            { "type": "return", "argument": { "type": "identifier", "name": "i" } }
        ]
    }]
}"#;

#[test]
fn test_add_one_module_bytes() {
    let compiled = compile(ADD_ONE);
    assert!(compiled.diagnostics.is_empty());
    assert_eq!(
        compiled.to_bytes().unwrap(),
        vec![
            0x01, 0x0f, // version, length
            0x00, 0x6a, // no constants, UTF-8
            0x00, // no pragmas
            0x01, 0x01, 0x00, 0x01, b'f', // one function, named f
            0x01, 0x00, 0x04, 0xe0, 0x15, 0x20, 0x3a, // LOAD_VAR_S 0, CONST_1, ADD, RETURN
        ]
    );
}

#[test]
fn test_module_round_trip() {
    let compiled = compile(COUNT);
    let bytes = compiled.to_bytes().unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, compiled.module);
    assert_eq!(decoded.function_index_by_name("count"), Some(0));
}

#[test]
fn test_branches_land_on_instructions() {
    let compiled = compile(COUNT);
    let code = &compiled.module.functions()[0].code;
    let insns = disassemble(code).unwrap();
    let starts: Vec<usize> = insns.iter().map(|i| i.offset).collect();

    let mut branches = 0;
    for insn in &insns {
        if let DecodedOperand::Branch { target } = insn.operand {
            branches += 1;
            assert!(
                starts.contains(&target) || target == code.len(),
                "branch at {} lands on {target}",
                insn.offset
            );
        }
    }
    assert_eq!(branches, 2);
}

const EITHER: &str = r#"{
    "functions": [{
        "name": "either",
        "params": [{ "name": "a" }],
        "body": [{
            "type": "if",
            "test": { "type": "identifier", "name": "a" },
            "consequent": { "type": "return", "argument": { "type": "identifier", "name": "a" } },
            "alternate": { "type": "return" }
        }]
    }]
}"#;

#[test]
fn test_optimizer_shrinks_code() {
    let optimized = compile(EITHER);
    let plain = Compiler::new(CompilerOptions {
        optimizer: OptimizerOptions::none(),
        ..CompilerOptions::default()
    })
    .compile(&unit(EITHER))
    .unwrap();

    let optimized = &optimized.module.functions()[0].code;
    let plain = &plain.module.functions()[0].code;
    assert!(optimized.len() < plain.len());
}

#[test]
fn test_semantic_errors_are_collected() {
    let json = r#"{
        "functions": [{
            "name": "f",
            "body": [
                { "type": "break", "line": 2 },
                { "type": "return", "line": 3,
                  "argument": { "type": "identifier", "name": "x", "line": 3 } }
            ]
        }]
    }"#;
    let err = Compiler::default().compile(&unit(json)).unwrap_err();
    let diagnostics = match err {
        Error::Compilation(diagnostics) => diagnostics,
        other => panic!("expected a compilation error, got {other:?}"),
    };
    let lines: Vec<u32> = diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![2, 3]);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::NotWithinLoop("break"));
    assert_eq!(
        diagnostics[1].to_string(),
        "3:error: unknown variable `x`"
    );
}

#[test]
fn test_warnings_do_not_fail() {
    let json = r#"{
        "functions": [{
            "name": "f",
            "body": [{ "type": "return", "argument":
                { "type": "literal", "value": { "integer": 10000000000 }, "line": 5 } }]
        }]
    }"#;
    let compiled = compile(json);
    assert_eq!(compiled.diagnostics.len(), 1);
    assert_eq!(compiled.diagnostics[0].severity, Severity::Warning);
}

#[test]
fn test_listings_on_request() {
    let options = CompilerOptions {
        print_symbolic_assembler: true,
        print_assembler: true,
        ..CompilerOptions::default()
    };
    let compiled = Compiler::new(options).compile(&unit(ADD_ONE)).unwrap();
    assert_eq!(compiled.listings.len(), 1);

    let listing = &compiled.listings[0];
    assert_eq!(listing.name, "f");
    assert_eq!(
        listing.symbolic.as_deref(),
        Some("    LOAD_VAR 0\n    CONST_1\n    ADD\n    RETURN\n")
    );
    let assembler = listing.assembler.as_deref().unwrap();
    assert!(assembler.starts_with("0x0000  LOAD_VAR_S"));
    assert_eq!(assembler.lines().count(), 4);

    assert!(compile(ADD_ONE).listings.is_empty());
}

#[test]
fn test_pragmas_and_metadata() {
    let json = r#"{
        "pragmas": [
            { "kind": "access", "domain": "example.com", "line": 1 },
            { "kind": "meta", "property": "user_agent", "name": "cache", "content": "no", "line": 2 },
            { "kind": "meta", "property": "name", "name": "author", "content": "me", "line": 3 }
        ],
        "functions": [{ "name": "main", "is_extern": true }]
    }"#;
    let compiled = compile(json);
    assert_eq!(compiled.module.pragmas().len(), 2);
    assert_eq!(compiled.metadata.len(), 1);
    assert_eq!(compiled.metadata[0].name, "author");

    // An empty body still returns.
    assert_eq!(compiled.module.functions()[0].code, vec![0x3b]);

    let decoded = decode(&compiled.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded.pragmas(), compiled.module.pragmas());
}

#[test]
fn test_latin1_strings() {
    let json = r#"{
        "functions": [{
            "name": "f",
            "body": [{ "type": "return", "argument":
                { "type": "literal", "value": { "string": "café" } } }]
        }]
    }"#;
    let options = CompilerOptions {
        use_latin1_strings: true,
        ..CompilerOptions::default()
    };
    let compiled = Compiler::new(options).compile(&unit(json)).unwrap();
    let bytes = compiled.to_bytes().unwrap();
    // charset 4 (ISO-8859-1), one type 6 string of four bytes
    assert_eq!(&bytes[2..10], &[0x01, 0x04, 0x06, 0x04, b'c', b'a', b'f', 0xe9]);
}
