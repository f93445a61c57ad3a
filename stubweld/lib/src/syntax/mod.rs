//! Parsing, AST and emission for Python stub files.

pub mod ast;
pub mod parse;
pub mod unparse;

pub use ast::{ClassDef, Expr, FunctionDef, Module, Param, ParamKind, Stmt, Verbatim};
pub use parse::{parse_file, parse_module};
pub use unparse::unparse;
