//! CR3BP equation derivation: the equations of motion of the circular
//! restricted three-body problem in the rotating frame (nondimensional
//! units, mass parameter `mu`), and the variational equation for the state
//! transition matrix, as symbolic equalities ready for routine assembly.
//!
//! State layout: `S = [x, y, z, vx, vy, vz]` as a 6x1 column. The STM block
//! is carried as 6x3, the columns actually propagated downstream.

use crate::args::{Equality, InputSymbol};
use crate::calculus::jacobian;
use crate::expr::{simplify, Expr, ExprMatrix, MatrixSymbol, Symbol};
use crate::routine::{make_routine, Routine, RoutineOptions};
use crate::varmap::VarMap;
use crate::CodegenError;

pub const STATE_DIM: usize = 6;
pub const STM_COLS: usize = 3;

/// The derived CR3BP system: input symbol shapes, the element placeholder
/// map, and the two output equalities.
#[derive(Debug, Clone)]
pub struct Cr3bpSystem {
  pub s: MatrixSymbol,
  pub stm: MatrixSymbol,
  pub mu: Symbol,
  pub var_map: VarMap,
  pub ds_eq: Equality,
  pub dstm_eq: Equality,
}

fn norm_sq(v: &[Expr; 3]) -> Expr {
  simplify(
    v[0].clone().pow(Expr::int(2))
      + v[1].clone().pow(Expr::int(2))
      + v[2].clone().pow(Expr::int(2)),
  )
}

/// Derive the state derivative `dS` and the variational equation
/// `dSTM = jacobian(dS, S) * STM`.
pub fn derive() -> Result<Cr3bpSystem, CodegenError> {
  let s_mat = MatrixSymbol::new("S", STATE_DIM, 1);
  let stm_mat = MatrixSymbol::new("STM", STATE_DIM, STM_COLS);
  let mu_sym = Symbol::positive("mu");

  let s: Vec<Expr> = (0..STATE_DIM)
    .map(|i| Expr::sym(&format!("S{}", i)))
    .collect();
  let mu = Expr::sym("mu");

  // Positions relative to the primaries at (-mu, 0, 0) and (1 - mu, 0, 0)
  let r13 = [s[0].clone() + mu.clone(), s[1].clone(), s[2].clone()];
  let r23 = [
    s[0].clone() - (Expr::int(1) - mu.clone()),
    s[1].clone(),
    s[2].clone(),
  ];

  // 1/|r|^3 terms, kept as powers of the squared norms
  let c13 = (Expr::int(1) - mu.clone()) * norm_sq(&r13).pow(Expr::real(-1.5));
  let c23 = mu.clone() * norm_sq(&r23).pow(Expr::real(-1.5));

  // Coriolis and centrifugal contributions of the rotating frame
  let rotating = [
    Expr::int(2) * s[4].clone() + s[0].clone(),
    Expr::int(-2) * s[3].clone() + s[1].clone(),
    Expr::int(0),
  ];

  let mut elems: Vec<Expr> = s[3..STATE_DIM].to_vec();
  for i in 0..3 {
    elems.push(simplify(
      rotating[i].clone()
        - c13.clone() * r13[i].clone()
        - c23.clone() * r23[i].clone(),
    ));
  }
  let ds = ExprMatrix::from_column(elems);

  let state_names: Vec<String> =
    (0..STATE_DIM).map(|i| format!("S{}", i)).collect();
  let state_refs: Vec<&str> =
    state_names.iter().map(|n| n.as_str()).collect();
  let jac = jacobian(&ds, &state_refs)?;

  let stm = ExprMatrix::new(
    STATE_DIM,
    STM_COLS,
    (0..STATE_DIM * STM_COLS)
      .map(|k| Expr::sym(&format!("STM{}", k)))
      .collect(),
  );
  let dstm = jac.matmul(&stm)?;

  let mut var_map = VarMap::for_matrix(&s_mat);
  var_map.extend_matrix(&stm_mat);

  let ds_eq = Equality::matrix(MatrixSymbol::new("dS", STATE_DIM, 1), ds)?;
  let dstm_eq =
    Equality::matrix(MatrixSymbol::new("dSTM", STATE_DIM, STM_COLS), dstm)?;

  Ok(Cr3bpSystem {
    s: s_mat,
    stm: stm_mat,
    mu: mu_sym,
    var_map,
    ds_eq,
    dstm_eq,
  })
}

/// The two CR3BP routines the generated C sources contain: the state
/// derivative alone, and the state derivative jointly with the STM
/// derivative so their shared terms are extracted once.
pub fn routines() -> Result<Vec<Routine>, CodegenError> {
  let system = derive()?;

  let mut options = RoutineOptions::new();
  options.var_map = system.var_map.clone();

  let ds_routine = make_routine(
    "c_dS_CR3BP",
    &[
      InputSymbol::Matrix(system.s.clone()),
      InputSymbol::Scalar(system.mu.clone()),
    ],
    &[system.ds_eq.clone()],
    &options,
  )?;

  let dstm_routine = make_routine(
    "c_dSTM_CR3BP",
    &[
      InputSymbol::Matrix(system.s.clone()),
      InputSymbol::Matrix(system.stm.clone()),
      InputSymbol::Scalar(system.mu.clone()),
    ],
    &[system.ds_eq.clone(), system.dstm_eq.clone()],
    &options,
  )?;

  Ok(vec![ds_routine, dstm_routine])
}
