//! C99 code emission: serializes `Routine` descriptors into a source file
//! and a matching header. Inputs come first in the parameter list, then
//! outputs (passed as pointers); the body assigns each local in listed
//! order, then each output, and returns the result if there is one.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::args::{ArgRole, Argument, Rhs};
use crate::expr::{format_real, BinaryOperator, Expr, UnaryOperator};
use crate::routine::Routine;
use crate::CodegenError;

#[derive(Debug, Clone, Copy, Default)]
pub struct C99CodeGen;

/// Matrix shapes by argument name, needed to flatten element references
/// into row-major single indices.
type Shapes = HashMap<String, (usize, usize)>;

impl C99CodeGen {
  pub fn new() -> Self {
    C99CodeGen
  }

  /// Write `<prefix>.c` and `<prefix>.h`.
  pub fn write(
    &self,
    routines: &[Routine],
    prefix: &Path,
  ) -> Result<(), CodegenError> {
    let stem = prefix
      .file_name()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "generated".to_string());
    let source = self.render_source(routines, &format!("{}.h", stem))?;
    let header = self.render_header(routines, &stem);
    fs::write(prefix.with_extension("c"), source)?;
    fs::write(prefix.with_extension("h"), header)?;
    Ok(())
  }

  pub fn render_source(
    &self,
    routines: &[Routine],
    header_name: &str,
  ) -> Result<String, CodegenError> {
    let mut out = String::new();
    out.push_str(&format!("#include \"{}\"\n", header_name));
    out.push_str("#include <math.h>\n");
    for routine in routines {
      out.push_str(&render_routine(routine)?);
    }
    Ok(out)
  }

  pub fn render_header(&self, routines: &[Routine], stem: &str) -> String {
    let guard: String = stem
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() {
          c.to_ascii_uppercase()
        } else {
          '_'
        }
      })
      .collect();
    let mut out = String::new();
    out.push_str(&format!("#ifndef {}_H\n", guard));
    out.push_str(&format!("#define {}_H\n", guard));
    for routine in routines {
      out.push_str(&format!("{};\n", signature(routine)));
    }
    out.push_str("#endif\n");
    out
  }
}

fn parameter(arg: &Argument) -> String {
  match (arg.role, &arg.dimensions) {
    (ArgRole::Input, None) => format!("double {}", arg.name),
    (_, Some(_)) => format!("double *{}", arg.name),
    (ArgRole::Output, None) => format!("double *{}", arg.name),
  }
}

fn signature(routine: &Routine) -> String {
  let return_type = if routine.result().is_some() {
    "double"
  } else {
    "void"
  };
  let params: Vec<String> =
    routine.arguments().iter().map(parameter).collect();
  format!("{} {}({})", return_type, routine.name(), params.join(", "))
}

fn shapes_of(routine: &Routine) -> Shapes {
  let mut shapes = Shapes::new();
  for arg in routine.arguments() {
    if let Some(dims) = &arg.dimensions {
      let (rows, cols) = match dims.as_slice() {
        [(0, r)] => (r + 1, 1),
        [(0, r), (0, c)] => (r + 1, c + 1),
        _ => continue,
      };
      shapes.insert(arg.name.clone(), (rows, cols));
    }
  }
  shapes
}

fn render_routine(routine: &Routine) -> Result<String, CodegenError> {
  let shapes = shapes_of(routine);
  let mut out = String::new();
  out.push_str(&format!("{} {{\n", signature(routine)));
  for local in routine.local_vars() {
    out.push_str(&format!(
      "   double {} = {};\n",
      local.name,
      c_expr(&local.expr, 0, &shapes)?
    ));
  }
  for arg in routine.output_arguments() {
    match arg.expr.as_ref() {
      Some(Rhs::Scalar(expr)) => {
        out.push_str(&format!(
          "   *{} = {};\n",
          arg.name,
          c_expr(expr, 0, &shapes)?
        ));
      }
      Some(Rhs::Matrix(matrix)) => {
        for row in 0..matrix.rows() {
          for col in 0..matrix.cols() {
            let flat = row * matrix.cols() + col;
            out.push_str(&format!(
              "   {}[{}] = {};\n",
              arg.name,
              flat,
              c_expr(matrix.get(row, col), 0, &shapes)?
            ));
          }
        }
      }
      None => {}
    }
  }
  if let Some(result) = routine.result() {
    out.push_str(&format!("   return {};\n", c_expr(result, 0, &shapes)?));
  }
  out.push_str("}\n");
  Ok(out)
}

fn precedence(expr: &Expr) -> u8 {
  match expr {
    Expr::BinaryOp { op: BinaryOperator::Plus, .. }
    | Expr::BinaryOp { op: BinaryOperator::Minus, .. } => 1,
    Expr::BinaryOp { op: BinaryOperator::Times, .. }
    | Expr::BinaryOp { op: BinaryOperator::Divide, .. } => 2,
    Expr::UnaryOp { .. } => 3,
    Expr::Integer(n) if *n < 0 => 3,
    Expr::Real(f) if f.into_inner() < 0.0 => 3,
    _ => 4,
  }
}

fn c_expr(
  expr: &Expr,
  parent_prec: u8,
  shapes: &Shapes,
) -> Result<String, CodegenError> {
  let prec = precedence(expr);
  let body = match expr {
    Expr::Integer(n) => n.to_string(),
    Expr::Real(f) => format_real(f.into_inner()),
    Expr::Symbol(name) => name.clone(),
    Expr::MatrixElement { matrix, row, col } => {
      let (_, cols) = shapes
        .get(matrix)
        .copied()
        .ok_or_else(|| CodegenError::UnboundSymbol(matrix.clone()))?;
      format!("{}[{}]", matrix, row * cols + col)
    }
    Expr::UnaryOp { op: UnaryOperator::Minus, operand } => {
      format!("-{}", c_expr(operand, prec + 1, shapes)?)
    }
    Expr::BinaryOp { op: BinaryOperator::Power, left, right } => {
      format!(
        "pow({}, {})",
        c_expr(left, 0, shapes)?,
        c_expr(right, 0, shapes)?
      )
    }
    Expr::BinaryOp { op, left, right } => {
      let symbol = match op {
        BinaryOperator::Plus => " + ",
        BinaryOperator::Minus => " - ",
        BinaryOperator::Times => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Power => unreachable!(),
      };
      let right_prec = match op {
        // Subtraction and division do not associate to the right
        BinaryOperator::Minus | BinaryOperator::Divide => prec + 1,
        _ => prec,
      };
      // An integer literal beside `/` would trigger C integer division
      let side = |e: &Expr, p: u8| match (op, e) {
        (BinaryOperator::Divide, Expr::Integer(n)) => {
          Ok(format_real(*n as f64))
        }
        _ => c_expr(e, p, shapes),
      };
      format!("{}{}{}", side(left, prec)?, symbol, side(right, right_prec)?)
    }
    Expr::FunctionCall { name, args } => {
      let parts: Result<Vec<String>, CodegenError> =
        args.iter().map(|a| c_expr(a, 0, shapes)).collect();
      format!("{}({})", name, parts?.join(", "))
    }
  };
  if prec < parent_prec {
    Ok(format!("({})", body))
  } else {
    Ok(body)
  }
}
