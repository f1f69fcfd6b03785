//! Argument classification: turning declared input symbols and output
//! equalities into ordered, dimensioned argument descriptors, and rejecting
//! malformed equations before any optimization work starts.

use std::collections::HashSet;

use crate::expr::{Expr, ExprMatrix, MatrixSymbol, Symbol};
use crate::varmap::VarMap;
use crate::CodegenError;

/// Whether a routine parameter is consumed or populated by the routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRole {
  Input,
  Output,
}

/// A symbol declared as a routine input.
#[derive(Debug, Clone)]
pub enum InputSymbol {
  Scalar(Symbol),
  Matrix(MatrixSymbol),
}

impl InputSymbol {
  pub fn name(&self) -> &str {
    match self {
      InputSymbol::Scalar(s) => &s.name,
      InputSymbol::Matrix(m) => &m.name,
    }
  }
}

/// The left-hand side of an equality: the quantity being assigned.
#[derive(Debug, Clone)]
pub enum Target {
  Scalar(Symbol),
  Matrix(MatrixSymbol),
}

impl Target {
  pub fn name(&self) -> &str {
    match self {
      Target::Scalar(s) => &s.name,
      Target::Matrix(m) => &m.name,
    }
  }

  /// (rows, cols), with scalars as 1x1.
  pub fn shape(&self) -> (usize, usize) {
    match self {
      Target::Scalar(_) => (1, 1),
      Target::Matrix(m) => (m.rows, m.cols),
    }
  }
}

/// A shape-tagged right-hand side.
#[derive(Debug, Clone)]
pub enum Rhs {
  Scalar(Expr),
  Matrix(ExprMatrix),
}

impl Rhs {
  pub fn shape(&self) -> (usize, usize) {
    match self {
      Rhs::Scalar(_) => (1, 1),
      Rhs::Matrix(m) => (m.rows(), m.cols()),
    }
  }

  /// The scalar expressions of this side, row-major.
  pub fn elements(&self) -> Vec<&Expr> {
    match self {
      Rhs::Scalar(e) => vec![e],
      Rhs::Matrix(m) => m.iter().collect(),
    }
  }
}

/// An output assignment: `target = rhs`, shape-checked at construction.
#[derive(Debug, Clone)]
pub struct Equality {
  pub target: Target,
  pub rhs: Rhs,
}

impl Equality {
  pub fn new(target: Target, rhs: Rhs) -> Result<Self, CodegenError> {
    let (target_rows, target_cols) = target.shape();
    let (expr_rows, expr_cols) = rhs.shape();
    if (target_rows, target_cols) != (expr_rows, expr_cols) {
      return Err(CodegenError::ShapeMismatch {
        target: target.name().to_string(),
        target_rows,
        target_cols,
        expr_rows,
        expr_cols,
      });
    }
    Ok(Equality { target, rhs })
  }

  pub fn scalar(symbol: Symbol, expr: Expr) -> Result<Self, CodegenError> {
    Equality::new(Target::Scalar(symbol), Rhs::Scalar(expr))
  }

  pub fn matrix(
    symbol: MatrixSymbol,
    matrix: ExprMatrix,
  ) -> Result<Self, CodegenError> {
    Equality::new(Target::Matrix(symbol), Rhs::Matrix(matrix))
  }
}

/// A role-tagged routine parameter. Matrix-shaped arguments carry index
/// bounds `[(0, rows-1), (0, cols-1)]` (the column bound is omitted for
/// column vectors); scalars carry none. Outputs additionally carry their
/// final expressions once the assembler has produced them.
#[derive(Debug, Clone)]
pub struct Argument {
  pub role: ArgRole,
  pub name: String,
  pub dimensions: Option<Vec<(usize, usize)>>,
  pub expr: Option<Rhs>,
}

fn dimensions_of(rows: usize, cols: usize) -> Vec<(usize, usize)> {
  if cols == 1 {
    vec![(0, rows - 1)]
  } else {
    vec![(0, rows - 1), (0, cols - 1)]
  }
}

/// Build the ordered input argument descriptors, declaration order kept.
pub fn classify_inputs(in_symbols: &[InputSymbol]) -> Vec<Argument> {
  in_symbols
    .iter()
    .map(|s| match s {
      InputSymbol::Scalar(sym) => Argument {
        role: ArgRole::Input,
        name: sym.name.clone(),
        dimensions: None,
        expr: None,
      },
      InputSymbol::Matrix(m) => Argument {
        role: ArgRole::Input,
        name: m.name.clone(),
        dimensions: Some(dimensions_of(m.rows, m.cols)),
        expr: None,
      },
    })
    .collect()
}

/// Check that every free symbol and matrix reference on the right-hand
/// sides is bound by a declared input or a global. Runs on the unflattened
/// (reverse-mapped) form so placeholder symbols resolve to the matrices
/// they stand for.
pub fn check_bindings(
  in_symbols: &[InputSymbol],
  out_eqs: &[Equality],
  global_vars: &[String],
  var_map: &VarMap,
) -> Result<(), CodegenError> {
  let mut bound_scalars: HashSet<&str> =
    global_vars.iter().map(|g| g.as_str()).collect();
  let mut bound_matrices: HashSet<&str> = HashSet::new();
  for s in in_symbols {
    match s {
      InputSymbol::Scalar(sym) => {
        bound_scalars.insert(&sym.name);
      }
      InputSymbol::Matrix(m) => {
        bound_matrices.insert(&m.name);
      }
    }
  }

  for eq in out_eqs {
    for element in eq.rhs.elements() {
      let restored = var_map.reverse(element);
      for name in restored.free_symbols() {
        if !bound_scalars.contains(name.as_str()) {
          return Err(CodegenError::UnboundSymbol(name));
        }
      }
      for name in restored.matrix_names() {
        if !bound_matrices.contains(name.as_str()) {
          return Err(CodegenError::UnboundSymbol(name));
        }
      }
    }
  }
  Ok(())
}

/// Build an output argument descriptor for one equality target. The final
/// expression is attached by the assembler after optimization.
pub fn output_argument(target: &Target, expr: Rhs) -> Argument {
  match target {
    Target::Scalar(sym) => Argument {
      role: ArgRole::Output,
      name: sym.name.clone(),
      dimensions: None,
      expr: Some(expr),
    },
    Target::Matrix(m) => Argument {
      role: ArgRole::Output,
      name: m.name.clone(),
      dimensions: Some(dimensions_of(m.rows, m.cols)),
      expr: Some(expr),
    },
  }
}
