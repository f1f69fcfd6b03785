//! The substitution bridge between matrix-element expressions and flat
//! scalar placeholders. Scalar-oriented passes (CSE, power expansion) run on
//! the placeholder side; the inverse map restores matrix elements before a
//! routine is assembled.

use std::collections::HashMap;

use crate::expr::{Expr, MatrixSymbol};

/// A bidirectional map between compound expressions (typically matrix
/// elements) and flat placeholder symbols. The two directions are exact
/// inverses: `reverse(forward(e))` reproduces `e` structurally.
#[derive(Debug, Clone, Default)]
pub struct VarMap {
  forward: HashMap<Expr, Expr>,
  reverse: HashMap<Expr, Expr>,
}

impl VarMap {
  pub fn new() -> Self {
    VarMap::default()
  }

  /// The canonical map for one matrix: element (r, c) maps to a scalar
  /// placeholder named after the row-major flat index, e.g. `S[2, 0]` of a
  /// 6x1 `S` maps to the symbol `S2`.
  pub fn for_matrix(matrix: &MatrixSymbol) -> Self {
    let mut map = VarMap::new();
    map.extend_matrix(matrix);
    map
  }

  /// Add the canonical element placeholders for another matrix.
  pub fn extend_matrix(&mut self, matrix: &MatrixSymbol) {
    for row in 0..matrix.rows {
      for col in 0..matrix.cols {
        let flat = row * matrix.cols + col;
        self.insert(
          matrix.element(row, col),
          Expr::sym(&format!("{}{}", matrix.name, flat)),
        );
      }
    }
  }

  pub fn insert(&mut self, compound: Expr, placeholder: Expr) {
    self.reverse.insert(placeholder.clone(), compound.clone());
    self.forward.insert(compound, placeholder);
  }

  pub fn is_empty(&self) -> bool {
    self.forward.is_empty()
  }

  /// Rewrite matrix elements (compounds) into their placeholders.
  pub fn forward(&self, expr: &Expr) -> Expr {
    expr.xreplace(&self.forward)
  }

  /// Rewrite placeholders back into their compound forms.
  pub fn reverse(&self, expr: &Expr) -> Expr {
    expr.xreplace(&self.reverse)
  }
}
