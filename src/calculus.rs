//! Symbolic differentiation over the expression tree, enough to derive
//! variational equations (Jacobians) for equation producers.

use crate::expr::{simplify, BinaryOperator, Expr, ExprMatrix, UnaryOperator};
use crate::CodegenError;

/// d/d`var` of `expr`. Matrix element references are treated as constants;
/// differentiation happens on the flattened scalar side of the bridge.
pub fn differentiate(expr: &Expr, var: &str) -> Result<Expr, CodegenError> {
  match expr {
    // Constants
    Expr::Integer(_) | Expr::Real(_) | Expr::MatrixElement { .. } => {
      Ok(Expr::Integer(0))
    }

    // Variable
    Expr::Symbol(name) => {
      if name == var {
        Ok(Expr::Integer(1))
      } else {
        Ok(Expr::Integer(0))
      }
    }

    Expr::UnaryOp { op: UnaryOperator::Minus, operand } => {
      let d = differentiate(operand, var)?;
      Ok(simplify(-d))
    }

    Expr::BinaryOp { op, left, right } => {
      use BinaryOperator::*;
      match op {
        Plus => {
          let da = differentiate(left, var)?;
          let db = differentiate(right, var)?;
          Ok(simplify(da + db))
        }
        Minus => {
          let da = differentiate(left, var)?;
          let db = differentiate(right, var)?;
          Ok(simplify(da - db))
        }
        Times => {
          // Product rule: a'*b + a*b'
          let da = differentiate(left, var)?;
          let db = differentiate(right, var)?;
          Ok(simplify(
            da * right.as_ref().clone() + left.as_ref().clone() * db,
          ))
        }
        Divide => {
          // Quotient rule: (a'*b - a*b') / b^2
          let da = differentiate(left, var)?;
          let db = differentiate(right, var)?;
          let numerator =
            da * right.as_ref().clone() - left.as_ref().clone() * db;
          let denominator = right.as_ref().clone().pow(Expr::Integer(2));
          Ok(simplify(numerator / denominator))
        }
        Power => {
          let base = left.as_ref();
          let exponent = right.as_ref();
          if !exponent.contains_symbol(var) {
            // Power rule: c * u^(c-1) * u'
            let du = differentiate(base, var)?;
            let decremented = match exponent {
              Expr::Integer(n) => Expr::Integer(n - 1),
              Expr::Real(f) => Expr::real(f.into_inner() - 1.0),
              other => other.clone() - Expr::Integer(1),
            };
            Ok(simplify(
              exponent.clone() * base.clone().pow(decremented) * du,
            ))
          } else {
            // General rule: u^v * (v' * log(u) + v * u' / u)
            let du = differentiate(base, var)?;
            let dv = differentiate(exponent, var)?;
            let log_u = Expr::func("log", vec![base.clone()]);
            Ok(simplify(
              base.clone().pow(exponent.clone())
                * (dv * log_u + exponent.clone() * du / base.clone()),
            ))
          }
        }
      }
    }

    Expr::FunctionCall { name, args } => {
      if args.len() != 1 {
        return Err(CodegenError::UnsupportedForm(name.clone()));
      }
      let u = &args[0];
      let du = differentiate(u, var)?;
      let outer = match name.as_str() {
        "sin" => Expr::func("cos", vec![u.clone()]),
        "cos" => -Expr::func("sin", vec![u.clone()]),
        "tan" => {
          // 1 / cos^2
          Expr::Integer(1)
            / Expr::func("cos", vec![u.clone()]).pow(Expr::Integer(2))
        }
        "sqrt" => {
          Expr::Integer(1)
            / (Expr::Integer(2) * Expr::func("sqrt", vec![u.clone()]))
        }
        "exp" => Expr::func("exp", vec![u.clone()]),
        "log" => Expr::Integer(1) / u.clone(),
        "log1p" => {
          Expr::Integer(1) / (Expr::Integer(1) + u.clone())
        }
        "expm1" => Expr::func("exp", vec![u.clone()]),
        "sinh" => Expr::func("cosh", vec![u.clone()]),
        "cosh" => Expr::func("sinh", vec![u.clone()]),
        "tanh" => {
          Expr::Integer(1)
            - Expr::func("tanh", vec![u.clone()]).pow(Expr::Integer(2))
        }
        "asin" => {
          Expr::Integer(1)
            / Expr::func(
              "sqrt",
              vec![Expr::Integer(1) - u.clone().pow(Expr::Integer(2))],
            )
        }
        "acos" => {
          -(Expr::Integer(1)
            / Expr::func(
              "sqrt",
              vec![Expr::Integer(1) - u.clone().pow(Expr::Integer(2))],
            ))
        }
        "atan" => {
          Expr::Integer(1)
            / (Expr::Integer(1) + u.clone().pow(Expr::Integer(2)))
        }
        _ => return Err(CodegenError::UnsupportedForm(name.clone())),
      };
      Ok(simplify(outer * du))
    }
  }
}

/// Jacobian of a column vector of expressions with respect to `vars`:
/// entry (i, j) is d(vec_i)/d(vars_j).
pub fn jacobian(
  vec: &ExprMatrix,
  vars: &[&str],
) -> Result<ExprMatrix, CodegenError> {
  if vec.cols() != 1 {
    return Err(CodegenError::ShapeMismatch {
      target: "jacobian".to_string(),
      target_rows: vec.rows(),
      target_cols: 1,
      expr_rows: vec.rows(),
      expr_cols: vec.cols(),
    });
  }
  let mut elems = Vec::with_capacity(vec.rows() * vars.len());
  for i in 0..vec.rows() {
    for var in vars {
      elems.push(differentiate(vec.get(i, 0), var)?);
    }
  }
  Ok(ExprMatrix::new(vec.rows(), vars.len(), elems))
}
