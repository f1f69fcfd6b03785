//! Symbolic expression substrate: scalar and matrix symbols, the immutable
//! expression tree, and the structural operations the routine pipeline is
//! built on (free-symbol collection, substitution, simplification, numeric
//! evaluation).

use std::collections::{HashMap, HashSet};
use std::fmt;

use ordered_float::OrderedFloat;

use crate::CodegenError;

/// Documentation-level domain tag for a symbol. Not enforced structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
  Real,
  Positive,
}

/// An atomic named scalar quantity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
  pub name: String,
  pub domain: Option<Domain>,
}

impl Symbol {
  pub fn new(name: &str) -> Self {
    Symbol { name: name.to_string(), domain: None }
  }

  pub fn real(name: &str) -> Self {
    Symbol { name: name.to_string(), domain: Some(Domain::Real) }
  }

  pub fn positive(name: &str) -> Self {
    Symbol { name: name.to_string(), domain: Some(Domain::Positive) }
  }
}

/// A named matrix-shaped quantity. Carries shape only, never values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatrixSymbol {
  pub name: String,
  pub rows: usize,
  pub cols: usize,
}

impl MatrixSymbol {
  pub fn new(name: &str, rows: usize, cols: usize) -> Self {
    MatrixSymbol { name: name.to_string(), rows, cols }
  }

  /// The expression referring to element (row, col) of this matrix.
  pub fn element(&self, row: usize, col: usize) -> Expr {
    Expr::MatrixElement { matrix: self.name.clone(), row, col }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
  Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
  Plus,
  Minus,
  Times,
  Divide,
  Power,
}

/// An immutable expression tree. `Real` carries an `OrderedFloat` so whole
/// trees can key the hash maps used by subexpression elimination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
  Integer(i64),
  Real(OrderedFloat<f64>),
  Symbol(String),
  MatrixElement { matrix: String, row: usize, col: usize },
  UnaryOp { op: UnaryOperator, operand: Box<Expr> },
  BinaryOp { op: BinaryOperator, left: Box<Expr>, right: Box<Expr> },
  FunctionCall { name: String, args: Vec<Expr> },
}

impl Expr {
  pub fn int(n: i64) -> Expr {
    Expr::Integer(n)
  }

  pub fn real(f: f64) -> Expr {
    Expr::Real(OrderedFloat(f))
  }

  pub fn sym(name: &str) -> Expr {
    Expr::Symbol(name.to_string())
  }

  pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::FunctionCall { name: name.to_string(), args }
  }

  pub fn pow(self, exponent: Expr) -> Expr {
    Expr::BinaryOp {
      op: BinaryOperator::Power,
      left: Box::new(self),
      right: Box::new(exponent),
    }
  }

  /// Leaf nodes: numbers, symbols, and matrix element references.
  pub fn is_atom(&self) -> bool {
    matches!(
      self,
      Expr::Integer(_)
        | Expr::Real(_)
        | Expr::Symbol(_)
        | Expr::MatrixElement { .. }
    )
  }

  /// The numeric value of a literal node, if it is one.
  pub fn as_number(&self) -> Option<f64> {
    match self {
      Expr::Integer(n) => Some(*n as f64),
      Expr::Real(f) => Some(f.into_inner()),
      _ => None,
    }
  }

  /// Direct children of this node, in order.
  pub fn children(&self) -> Vec<&Expr> {
    match self {
      Expr::UnaryOp { operand, .. } => vec![operand],
      Expr::BinaryOp { left, right, .. } => vec![left, right],
      Expr::FunctionCall { args, .. } => args.iter().collect(),
      _ => Vec::new(),
    }
  }

  /// Rebuild this node with every direct child replaced by `f(child)`.
  /// Atoms are returned unchanged.
  pub fn map_children<F: FnMut(&Expr) -> Expr>(&self, mut f: F) -> Expr {
    match self {
      Expr::UnaryOp { op, operand } => Expr::UnaryOp {
        op: *op,
        operand: Box::new(f(operand)),
      },
      Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
        op: *op,
        left: Box::new(f(left)),
        right: Box::new(f(right)),
      },
      Expr::FunctionCall { name, args } => Expr::FunctionCall {
        name: name.clone(),
        args: args.iter().map(f).collect(),
      },
      _ => self.clone(),
    }
  }

  /// Structural whole-node replacement, applied top-down: if the map has an
  /// entry for a subtree, the replacement is inserted as-is (it is not
  /// itself searched again).
  pub fn xreplace(&self, map: &HashMap<Expr, Expr>) -> Expr {
    if let Some(replacement) = map.get(self) {
      return replacement.clone();
    }
    self.map_children(|child| child.xreplace(map))
  }

  /// Names of all scalar symbols appearing in this expression.
  pub fn free_symbols(&self) -> HashSet<String> {
    let mut names = HashSet::new();
    self.collect_free_symbols(&mut names);
    names
  }

  fn collect_free_symbols(&self, names: &mut HashSet<String>) {
    if let Expr::Symbol(name) = self {
      names.insert(name.clone());
    }
    for child in self.children() {
      child.collect_free_symbols(names);
    }
  }

  /// Names of all matrices whose elements appear in this expression.
  pub fn matrix_names(&self) -> HashSet<String> {
    let mut names = HashSet::new();
    self.collect_matrix_names(&mut names);
    names
  }

  fn collect_matrix_names(&self, names: &mut HashSet<String>) {
    if let Expr::MatrixElement { matrix, .. } = self {
      names.insert(matrix.clone());
    }
    for child in self.children() {
      child.collect_matrix_names(names);
    }
  }

  pub fn contains_symbol(&self, name: &str) -> bool {
    match self {
      Expr::Symbol(s) => s == name,
      _ => self.children().iter().any(|c| c.contains_symbol(name)),
    }
  }
}

impl std::ops::Add for Expr {
  type Output = Self;

  fn add(self, rhs: Self) -> Self {
    Expr::BinaryOp {
      op: BinaryOperator::Plus,
      left: Box::new(self),
      right: Box::new(rhs),
    }
  }
}

impl std::ops::Sub for Expr {
  type Output = Self;

  fn sub(self, rhs: Self) -> Self {
    Expr::BinaryOp {
      op: BinaryOperator::Minus,
      left: Box::new(self),
      right: Box::new(rhs),
    }
  }
}

impl std::ops::Mul for Expr {
  type Output = Self;

  fn mul(self, rhs: Self) -> Self {
    Expr::BinaryOp {
      op: BinaryOperator::Times,
      left: Box::new(self),
      right: Box::new(rhs),
    }
  }
}

impl std::ops::Div for Expr {
  type Output = Self;

  fn div(self, rhs: Self) -> Self {
    Expr::BinaryOp {
      op: BinaryOperator::Divide,
      left: Box::new(self),
      right: Box::new(rhs),
    }
  }
}

impl std::ops::Neg for Expr {
  type Output = Self;

  fn neg(self) -> Self {
    Expr::UnaryOp {
      op: UnaryOperator::Minus,
      operand: Box::new(self),
    }
  }
}

/// Structural simplification: identity elements, zero annihilation, and
/// numeric constant folding. Applied bottom-up over a fresh copy.
pub fn simplify(expr: Expr) -> Expr {
  match expr {
    Expr::BinaryOp { op, left, right } => {
      let left = simplify(*left);
      let right = simplify(*right);

      use BinaryOperator::*;
      match (&op, &left, &right) {
        // 0 + x = x
        (Plus, Expr::Integer(0), _) => return right,
        // x + 0 = x
        (Plus, _, Expr::Integer(0)) => return left,
        // 0 * x = 0
        (Times, Expr::Integer(0), _) | (Times, _, Expr::Integer(0)) => {
          return Expr::Integer(0);
        }
        // 1 * x = x
        (Times, Expr::Integer(1), _) => return right,
        // x * 1 = x
        (Times, _, Expr::Integer(1)) => return left,
        // x - 0 = x
        (Minus, _, Expr::Integer(0)) => return left,
        // 0 - n = -n
        (Minus, Expr::Integer(0), Expr::Integer(n)) => {
          return Expr::Integer(-n);
        }
        // 0 - (-x) = x
        (
          Minus,
          Expr::Integer(0),
          Expr::UnaryOp { op: UnaryOperator::Minus, operand },
        ) => {
          return *operand.clone();
        }
        // 0 - x = -x
        (Minus, Expr::Integer(0), _) => {
          return Expr::UnaryOp {
            op: UnaryOperator::Minus,
            operand: Box::new(right),
          };
        }
        // 0 / x = 0
        (Divide, Expr::Integer(0), _) => return Expr::Integer(0),
        // x / 1 = x
        (Divide, _, Expr::Integer(1)) => return left,
        // x^0 = 1
        (Power, _, Expr::Integer(0)) => return Expr::Integer(1),
        // x^1 = x
        (Power, _, Expr::Integer(1)) => return left,
        // 0^n = 0 (for n > 0)
        (Power, Expr::Integer(0), Expr::Integer(n)) if *n > 0 => {
          return Expr::Integer(0);
        }
        // 1^n = 1
        (Power, Expr::Integer(1), _) => return Expr::Integer(1),
        // Integer folding
        (Plus, Expr::Integer(a), Expr::Integer(b)) => {
          return Expr::Integer(a + b);
        }
        (Minus, Expr::Integer(a), Expr::Integer(b)) => {
          return Expr::Integer(a - b);
        }
        (Times, Expr::Integer(a), Expr::Integer(b)) => {
          return Expr::Integer(a * b);
        }
        _ => {}
      }

      // Mixed numeric folding once at least one side is a real literal
      if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        if matches!(left, Expr::Real(_)) || matches!(right, Expr::Real(_)) {
          let folded = match op {
            Plus => Some(a + b),
            Minus => Some(a - b),
            Times => Some(a * b),
            Divide => Some(a / b),
            Power => Some(a.powf(b)),
          };
          if let Some(value) = folded {
            if value.is_finite() {
              return Expr::real(value);
            }
          }
        }
      }

      Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
      }
    }
    Expr::UnaryOp { op: UnaryOperator::Minus, operand } => {
      let operand = simplify(*operand);
      match operand {
        Expr::Integer(n) => Expr::Integer(-n),
        Expr::Real(f) => Expr::real(-f.into_inner()),
        // -(-x) = x
        Expr::UnaryOp { op: UnaryOperator::Minus, operand } => *operand,
        _ => Expr::UnaryOp {
          op: UnaryOperator::Minus,
          operand: Box::new(operand),
        },
      }
    }
    Expr::FunctionCall { name, args } => Expr::FunctionCall {
      name,
      args: args.into_iter().map(simplify).collect(),
    },
    other => other,
  }
}

/// Evaluate an expression numerically. Matrix elements are looked up under
/// the key `name[row,col]`; unknown symbols and functions are errors.
pub fn eval(
  expr: &Expr,
  env: &HashMap<String, f64>,
) -> Result<f64, CodegenError> {
  match expr {
    Expr::Integer(n) => Ok(*n as f64),
    Expr::Real(f) => Ok(f.into_inner()),
    Expr::Symbol(name) => env
      .get(name)
      .copied()
      .ok_or_else(|| CodegenError::UnboundSymbol(name.clone())),
    Expr::MatrixElement { matrix, row, col } => {
      let key = format!("{}[{},{}]", matrix, row, col);
      env
        .get(&key)
        .copied()
        .ok_or(CodegenError::UnboundSymbol(key))
    }
    Expr::UnaryOp { op: UnaryOperator::Minus, operand } => {
      Ok(-eval(operand, env)?)
    }
    Expr::BinaryOp { op, left, right } => {
      let a = eval(left, env)?;
      let b = eval(right, env)?;
      Ok(match op {
        BinaryOperator::Plus => a + b,
        BinaryOperator::Minus => a - b,
        BinaryOperator::Times => a * b,
        BinaryOperator::Divide => a / b,
        BinaryOperator::Power => a.powf(b),
      })
    }
    Expr::FunctionCall { name, args } => {
      let vals: Result<Vec<f64>, CodegenError> =
        args.iter().map(|a| eval(a, env)).collect();
      let vals = vals?;
      match (name.as_str(), vals.as_slice()) {
        ("sin", [x]) => Ok(x.sin()),
        ("cos", [x]) => Ok(x.cos()),
        ("tan", [x]) => Ok(x.tan()),
        ("asin", [x]) => Ok(x.asin()),
        ("acos", [x]) => Ok(x.acos()),
        ("atan", [x]) => Ok(x.atan()),
        ("atan2", [y, x]) => Ok(y.atan2(*x)),
        ("sinh", [x]) => Ok(x.sinh()),
        ("cosh", [x]) => Ok(x.cosh()),
        ("tanh", [x]) => Ok(x.tanh()),
        ("sqrt", [x]) => Ok(x.sqrt()),
        ("exp", [x]) => Ok(x.exp()),
        ("exp2", [x]) => Ok(x.exp2()),
        ("log", [x]) => Ok(x.ln()),
        ("expm1", [x]) => Ok(x.exp_m1()),
        ("log1p", [x]) => Ok(x.ln_1p()),
        ("fabs", [x]) => Ok(x.abs()),
        _ => Err(CodegenError::UnsupportedForm(name.clone())),
      }
    }
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", format_expr(self, 0))
  }
}

fn precedence(expr: &Expr) -> u8 {
  match expr {
    Expr::BinaryOp { op: BinaryOperator::Plus, .. }
    | Expr::BinaryOp { op: BinaryOperator::Minus, .. } => 1,
    Expr::BinaryOp { op: BinaryOperator::Times, .. }
    | Expr::BinaryOp { op: BinaryOperator::Divide, .. } => 2,
    Expr::UnaryOp { .. } => 3,
    Expr::BinaryOp { op: BinaryOperator::Power, .. } => 4,
    Expr::Integer(n) if *n < 0 => 3,
    Expr::Real(f) if f.into_inner() < 0.0 => 3,
    _ => 5,
  }
}

fn format_expr(expr: &Expr, parent_prec: u8) -> String {
  let prec = precedence(expr);
  let body = match expr {
    Expr::Integer(n) => n.to_string(),
    Expr::Real(f) => format_real(f.into_inner()),
    Expr::Symbol(name) => name.clone(),
    Expr::MatrixElement { matrix, row, col } => {
      format!("{}[{}, {}]", matrix, row, col)
    }
    Expr::UnaryOp { op: UnaryOperator::Minus, operand } => {
      format!("-{}", format_expr(operand, prec + 1))
    }
    Expr::BinaryOp { op, left, right } => {
      let symbol = match op {
        BinaryOperator::Plus => " + ",
        BinaryOperator::Minus => " - ",
        BinaryOperator::Times => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Power => "**",
      };
      let (left_prec, right_prec) = match op {
        // Subtraction and division do not associate to the right
        BinaryOperator::Minus | BinaryOperator::Divide => (prec, prec + 1),
        // Exponentiation associates to the right
        BinaryOperator::Power => (prec + 1, prec),
        _ => (prec, prec),
      };
      format!(
        "{}{}{}",
        format_expr(left, left_prec),
        symbol,
        format_expr(right, right_prec)
      )
    }
    Expr::FunctionCall { name, args } => {
      let parts: Vec<String> =
        args.iter().map(|a| format_expr(a, 0)).collect();
      format!("{}({})", name, parts.join(", "))
    }
  };
  if prec < parent_prec {
    format!("({})", body)
  } else {
    body
  }
}

/// Format a real literal so it stays recognizably floating-point.
pub fn format_real(f: f64) -> String {
  if f.fract() == 0.0 && f.abs() < 1e15 {
    format!("{:.1}", f)
  } else {
    format!("{}", f)
  }
}

/// A fixed-shape matrix of scalar expressions, stored row-major. Used for
/// matrix-valued right-hand sides and the Jacobian/variational machinery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprMatrix {
  rows: usize,
  cols: usize,
  elems: Vec<Expr>,
}

impl ExprMatrix {
  pub fn new(rows: usize, cols: usize, elems: Vec<Expr>) -> Self {
    assert_eq!(elems.len(), rows * cols, "element count must match shape");
    ExprMatrix { rows, cols, elems }
  }

  pub fn from_column(elems: Vec<Expr>) -> Self {
    let rows = elems.len();
    ExprMatrix { rows, cols: 1, elems }
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn get(&self, row: usize, col: usize) -> &Expr {
    &self.elems[row * self.cols + col]
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
    self.elems.iter()
  }

  pub fn map<F: FnMut(&Expr) -> Expr>(&self, f: F) -> ExprMatrix {
    ExprMatrix {
      rows: self.rows,
      cols: self.cols,
      elems: self.elems.iter().map(f).collect(),
    }
  }

  /// Matrix product, with each entry structurally simplified as it is
  /// assembled so zero terms drop out.
  pub fn matmul(&self, other: &ExprMatrix) -> Result<ExprMatrix, CodegenError> {
    if self.cols != other.rows {
      return Err(CodegenError::ShapeMismatch {
        target: "matmul".to_string(),
        target_rows: self.rows,
        target_cols: self.cols,
        expr_rows: other.rows,
        expr_cols: other.cols,
      });
    }
    let mut elems = Vec::with_capacity(self.rows * other.cols);
    for i in 0..self.rows {
      for j in 0..other.cols {
        let mut sum = Expr::Integer(0);
        for k in 0..self.cols {
          sum = sum + self.get(i, k).clone() * other.get(k, j).clone();
        }
        elems.push(simplify(sum));
      }
    }
    Ok(ExprMatrix::new(self.rows, other.cols, elems))
  }
}
