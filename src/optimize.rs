//! Per-expression algebraic rewriting: C99-style canonicalization of forms
//! with dedicated libm entry points, then bounded expansion of small integer
//! powers into repeated multiplication. Applied to every CSE local and every
//! output/result expression independently.

use crate::expr::{BinaryOperator, Expr};
use crate::CodegenError;

/// Function heads the rewriter understands. Anything else is rejected so a
/// form the target runtime cannot express never slips through silently.
const KNOWN_FUNCTIONS: &[&str] = &[
  "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sinh", "cosh",
  "tanh", "sqrt", "exp", "exp2", "log", "expm1", "log1p", "fabs",
];

/// Optimization configuration, passed explicitly into the assembler.
#[derive(Debug, Clone)]
pub struct Optimizations {
  /// Rewrite `exp(x) - 1`, `log(1 + x)`, `2**x` and half-integer powers
  /// into their dedicated C99 forms.
  pub c99_rewrites: bool,
  /// Expand `base**n` into repeated multiplication for integer exponents
  /// `2 <= n <= limit`, skipping function-call bases. Zero disables.
  pub expand_pow_limit: i64,
}

impl Default for Optimizations {
  fn default() -> Self {
    Optimizations { c99_rewrites: true, expand_pow_limit: 3 }
  }
}

/// Apply the configured rewrites to one expression.
pub fn optimize(
  expr: &Expr,
  opts: &Optimizations,
) -> Result<Expr, CodegenError> {
  check_functions(expr)?;
  let mut result = expr.clone();
  if opts.c99_rewrites {
    result = rewrite_c99(&result);
  }
  if opts.expand_pow_limit >= 2 {
    result = expand_pow(&result, opts.expand_pow_limit);
  }
  Ok(result)
}

fn check_functions(expr: &Expr) -> Result<(), CodegenError> {
  if let Expr::FunctionCall { name, .. } = expr {
    if !KNOWN_FUNCTIONS.contains(&name.as_str()) {
      return Err(CodegenError::UnsupportedForm(name.clone()));
    }
  }
  for child in expr.children() {
    check_functions(child)?;
  }
  Ok(())
}

fn is_one(expr: &Expr) -> bool {
  expr.as_number() == Some(1.0)
}

/// Bottom-up canonicalization toward forms with dedicated C99 primitives.
fn rewrite_c99(expr: &Expr) -> Expr {
  let rebuilt = expr.map_children(rewrite_c99);
  c99_rule(&rebuilt).unwrap_or(rebuilt)
}

fn c99_rule(expr: &Expr) -> Option<Expr> {
  match expr {
    // exp(x) - 1 -> expm1(x)
    Expr::BinaryOp { op: BinaryOperator::Minus, left, right }
      if is_one(right) =>
    {
      if let Expr::FunctionCall { name, args } = left.as_ref() {
        if name == "exp" && args.len() == 1 {
          return Some(Expr::func("expm1", vec![args[0].clone()]));
        }
      }
      None
    }
    // log(1 + x) -> log1p(x)
    Expr::FunctionCall { name, args } if name == "log" && args.len() == 1 => {
      if let Expr::BinaryOp { op: BinaryOperator::Plus, left, right } =
        &args[0]
      {
        if is_one(left) {
          return Some(Expr::func("log1p", vec![right.as_ref().clone()]));
        }
        if is_one(right) {
          return Some(Expr::func("log1p", vec![left.as_ref().clone()]));
        }
      }
      None
    }
    Expr::BinaryOp { op: BinaryOperator::Power, left, right } => {
      // 2**x -> exp2(x)
      if matches!(left.as_ref(), Expr::Integer(2))
        && right.as_number().is_none()
      {
        return Some(Expr::func("exp2", vec![right.as_ref().clone()]));
      }
      // x**0.5 -> sqrt(x), x**-0.5 -> 1 / sqrt(x), x**-1 -> 1 / x
      match right.as_number() {
        Some(e) if e == 0.5 => {
          Some(Expr::func("sqrt", vec![left.as_ref().clone()]))
        }
        Some(e) if e == -0.5 => Some(
          Expr::Integer(1)
            / Expr::func("sqrt", vec![left.as_ref().clone()]),
        ),
        Some(e) if e == -1.0 => {
          Some(Expr::Integer(1) / left.as_ref().clone())
        }
        _ => None,
      }
    }
    _ => None,
  }
}

/// Bottom-up power expansion. Bases that are function calls keep the power
/// form so the call is not recomputed per factor.
fn expand_pow(expr: &Expr, limit: i64) -> Expr {
  let rebuilt = expr.map_children(|child| expand_pow(child, limit));
  if let Expr::BinaryOp { op: BinaryOperator::Power, left, right } = &rebuilt
  {
    if let Expr::Integer(n) = right.as_ref() {
      if *n >= 2
        && *n <= limit
        && !matches!(left.as_ref(), Expr::FunctionCall { .. })
      {
        let base = left.as_ref().clone();
        let mut product = base.clone();
        for _ in 1..*n {
          product = product * base.clone();
        }
        return product;
      }
    }
  }
  rebuilt
}
