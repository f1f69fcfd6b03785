//! The routine assembler: the single linear pipeline that turns declared
//! inputs and output equalities into an immutable `Routine` descriptor.
//! Stages run exactly once, in order: classify, flatten, (optional) CSE,
//! optimize, unflatten, assemble. The first error aborts the whole run.

use crate::args::{
  check_bindings, classify_inputs, output_argument, ArgRole, Argument,
  Equality, InputSymbol, Rhs,
};
use crate::cse::{cse, CseOptions};
use crate::expr::{Expr, ExprMatrix};
use crate::optimize::{optimize, Optimizations};
use crate::varmap::VarMap;
use crate::CodegenError;

/// A CSE-extracted intermediate: computed once, referenced by every later
/// local and output expression that shares the subterm.
#[derive(Debug, Clone)]
pub struct LocalVariable {
  pub name: String,
  pub expr: Expr,
}

/// The language-agnostic descriptor of one callable numeric procedure.
/// Immutable once assembled; `make_routine` is the only construction path.
#[derive(Debug, Clone)]
pub struct Routine {
  name: String,
  arguments: Vec<Argument>,
  local_vars: Vec<LocalVariable>,
  result: Option<Expr>,
  global_vars: Vec<String>,
}

impl Routine {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// All arguments, inputs first, then outputs, declaration order kept
  /// within each role.
  pub fn arguments(&self) -> &[Argument] {
    &self.arguments
  }

  pub fn input_arguments(&self) -> impl Iterator<Item = &Argument> {
    self.arguments.iter().filter(|a| a.role == ArgRole::Input)
  }

  pub fn output_arguments(&self) -> impl Iterator<Item = &Argument> {
    self.arguments.iter().filter(|a| a.role == ArgRole::Output)
  }

  /// Locals in dependency order: each definition references only inputs,
  /// globals, and locals listed strictly earlier.
  pub fn local_vars(&self) -> &[LocalVariable] {
    &self.local_vars
  }

  pub fn result(&self) -> Option<&Expr> {
    self.result.as_ref()
  }

  pub fn global_vars(&self) -> &[String] {
    &self.global_vars
  }
}

/// Options for `make_routine` beyond the name, inputs, and equalities.
#[derive(Debug, Clone)]
pub struct RoutineOptions {
  /// Scalar expression returned by the routine, extracted jointly with the
  /// outputs. Requires `cse`.
  pub result: Option<Expr>,
  /// Names assumed present in the execution environment without being
  /// passed as arguments.
  pub global_vars: Vec<String>,
  /// Matrix-element placeholder map applied before optimization and
  /// inverted afterwards.
  pub var_map: VarMap,
  /// Whether to extract shared subexpressions at all. When disabled each
  /// output expression is optimized standalone.
  pub cse: bool,
  pub cse_options: CseOptions,
  pub optimizations: Optimizations,
}

impl RoutineOptions {
  pub fn new() -> Self {
    RoutineOptions {
      result: None,
      global_vars: Vec::new(),
      var_map: VarMap::new(),
      cse: true,
      cse_options: CseOptions::default(),
      optimizations: Optimizations::default(),
    }
  }
}

impl Default for RoutineOptions {
  fn default() -> Self {
    RoutineOptions::new()
  }
}

/// Assemble a routine from input symbols and output equalities.
pub fn make_routine(
  name: &str,
  in_symbols: &[InputSymbol],
  out_eqs: &[Equality],
  options: &RoutineOptions,
) -> Result<Routine, CodegenError> {
  if !is_identifier(name) {
    return Err(CodegenError::Config(format!(
      "routine name `{}` is not a valid identifier",
      name
    )));
  }
  if options.result.is_some() && !options.cse {
    return Err(CodegenError::Config(
      "a result expression requires cse to be enabled".to_string(),
    ));
  }

  // Classify: argument descriptors and fail-fast binding checks.
  let in_args = classify_inputs(in_symbols);
  check_bindings(in_symbols, out_eqs, &options.global_vars, &options.var_map)?;

  // Flatten: every right-hand side becomes scalar expressions over
  // placeholders, with segment lengths remembered per equality.
  let mut calc_exprs: Vec<Expr> = Vec::new();
  let mut segments: Vec<usize> = Vec::new();
  for eq in out_eqs {
    let elements = eq.rhs.elements();
    segments.push(elements.len());
    for element in elements {
      calc_exprs.push(options.var_map.forward(element));
    }
  }
  let has_result = options.result.is_some();
  if let Some(result) = &options.result {
    calc_exprs.push(options.var_map.forward(result));
  }

  // Joint extraction, with the trailing result split back off.
  let (common, mut out_exprs) = if options.cse {
    let extracted = cse(&calc_exprs, &options.cse_options);
    (extracted.locals, extracted.exprs)
  } else {
    (Vec::new(), calc_exprs)
  };
  let result_expr = if has_result { out_exprs.pop() } else { None };

  // Optimize each final expression, then restore matrix elements.
  let finish = |expr: &Expr| -> Result<Expr, CodegenError> {
    Ok(options.var_map.reverse(&optimize(expr, &options.optimizations)?))
  };

  let mut local_vars = Vec::with_capacity(common.len());
  for (local_name, expr) in &common {
    local_vars.push(LocalVariable {
      name: local_name.clone(),
      expr: finish(expr)?,
    });
  }

  let mut arguments = in_args;
  let mut offset = 0;
  for (eq, len) in out_eqs.iter().zip(&segments) {
    let slice = &out_exprs[offset..offset + len];
    offset += len;
    let rhs = match &eq.rhs {
      Rhs::Scalar(_) => Rhs::Scalar(finish(&slice[0])?),
      Rhs::Matrix(m) => {
        let elems: Result<Vec<Expr>, CodegenError> =
          slice.iter().map(|e| finish(e)).collect();
        Rhs::Matrix(ExprMatrix::new(m.rows(), m.cols(), elems?))
      }
    };
    arguments.push(output_argument(&eq.target, rhs));
  }

  let result = match &result_expr {
    Some(expr) => Some(finish(expr)?),
    None => None,
  };

  Ok(Routine {
    name: name.to_string(),
    arguments,
    local_vars,
    result,
    global_vars: options.global_vars.clone(),
  })
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
