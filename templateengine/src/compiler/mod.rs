//! This module contains the internals of the compiler.
#![allow(missing_docs)]
pub mod ast;
pub mod codegen;
pub mod instructions;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod tokens;
