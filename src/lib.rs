//! A WebAssembly MVP-subset interpreter.
//!
//! wasmvm decodes a binary module and executes its exported `main` function
//! on a stack-machine interpreter. Function bodies are interpreted in place:
//! a single pre-indexing pass maps every structured header to its matching
//! `else`/`end` address, so branches resolve in constant time without
//! re-scanning bytecode.
//!
//! # Modules
//!
//! - [`parser`] -- Binary format decoder. Reads `.wasm` bytes into a
//!   [`parser::module::Module`].
//! - [`runtime`] -- The execution engine: operand stack, linear memory,
//!   tables, call frames and the instruction dispatcher.
//!
//! # Example
//!
//! Build a module in memory and run its entry function:
//!
//! ```
//! use wasmvm::parser::module::ValueType;
//! use wasmvm::runtime::test_utils::{BodyBuilder, ModuleBuilder};
//! use wasmvm::runtime::{Value, Vm};
//!
//! let module = ModuleBuilder::new()
//!     .sig(&[ValueType::I32, ValueType::I32], &[ValueType::I32])
//!     .func(
//!         0,
//!         &[],
//!         BodyBuilder::new()
//!             .local_get(0)
//!             .local_get(1)
//!             .op(wasmvm::parser::opcode::I32_ADD)
//!             .finish(),
//!     )
//!     .export_main(0)
//!     .build();
//!
//! let mut vm = Vm::new(&module);
//! let results = vm.invoke_main(&["2".to_string(), "3".to_string()]).unwrap();
//! assert_eq!(results, vec![Value::I32(5)]);
//! ```

pub mod parser;
pub mod runtime;
