//! Common-subexpression elimination over a jointly processed list of scalar
//! expressions. Every non-atomic subtree that occurs more than once across
//! the whole list is hoisted into a named local, and the post-order rebuild
//! guarantees each local only references locals discovered before it.

use std::collections::HashMap;

use crate::expr::Expr;

/// Naming scheme for the extracted locals: `x0`, `x1`, ... by default.
#[derive(Debug, Clone)]
pub struct CseOptions {
  pub symbol_prefix: String,
}

impl Default for CseOptions {
  fn default() -> Self {
    CseOptions { symbol_prefix: "x".to_string() }
  }
}

/// Hoisted locals (in dependency order) plus the rewritten top-level
/// expressions, one per input expression.
#[derive(Debug, Clone)]
pub struct CseResult {
  pub locals: Vec<(String, Expr)>,
  pub exprs: Vec<Expr>,
}

pub fn cse(exprs: &[Expr], options: &CseOptions) -> CseResult {
  let mut counts: HashMap<&Expr, usize> = HashMap::new();
  for expr in exprs {
    count_subtrees(expr, &mut counts);
  }

  let mut builder = Builder {
    counts,
    prefix: options.symbol_prefix.clone(),
    assigned: HashMap::new(),
    locals: Vec::new(),
  };
  let rewritten: Vec<Expr> =
    exprs.iter().map(|e| builder.rebuild(e)).collect();

  CseResult { locals: builder.locals, exprs: rewritten }
}

fn count_subtrees<'a>(expr: &'a Expr, counts: &mut HashMap<&'a Expr, usize>) {
  if expr.is_atom() {
    return;
  }
  *counts.entry(expr).or_insert(0) += 1;
  for child in expr.children() {
    count_subtrees(child, counts);
  }
}

struct Builder<'a> {
  counts: HashMap<&'a Expr, usize>,
  prefix: String,
  // original subtree -> the local symbol standing in for it
  assigned: HashMap<Expr, Expr>,
  locals: Vec<(String, Expr)>,
}

impl Builder<'_> {
  fn rebuild(&mut self, expr: &Expr) -> Expr {
    if expr.is_atom() {
      return expr.clone();
    }
    let rebuilt = expr.map_children(|child| self.rebuild(child));
    if self.counts.get(expr).copied().unwrap_or(0) > 1 {
      if let Some(local) = self.assigned.get(expr) {
        return local.clone();
      }
      let name = format!("{}{}", self.prefix, self.locals.len());
      let local = Expr::sym(&name);
      self.locals.push((name, rebuilt));
      self.assigned.insert(expr.clone(), local.clone());
      return local;
    }
    rebuilt
  }
}
