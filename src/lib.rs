use thiserror::Error;

pub mod args;
pub mod calculus;
pub mod codegen;
pub mod cr3bp;
pub mod cse;
pub mod expr;
pub mod optimize;
pub mod routine;
pub mod varmap;

pub use args::{ArgRole, Argument, Equality, InputSymbol, Rhs, Target};
pub use cse::{CseOptions, CseResult};
pub use expr::{Domain, Expr, ExprMatrix, MatrixSymbol, Symbol};
pub use optimize::Optimizations;
pub use routine::{make_routine, LocalVariable, Routine, RoutineOptions};
pub use varmap::VarMap;

#[derive(Error, Debug)]
pub enum CodegenError {
  #[error(
    "shape mismatch for `{target}`: target is {target_rows}x{target_cols}, \
     expression is {expr_rows}x{expr_cols}"
  )]
  ShapeMismatch {
    target: String,
    target_rows: usize,
    target_cols: usize,
    expr_rows: usize,
    expr_cols: usize,
  },
  #[error("unbound symbol `{0}`")]
  UnboundSymbol(String),
  #[error("no rewrite rule for function `{0}`")]
  UnsupportedForm(String),
  #[error("configuration error: {0}")]
  Config(String),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}
