use std::collections::HashMap;

use symgen::{
  make_routine, ArgRole, CodegenError, Equality, Expr, ExprMatrix,
  InputSymbol, MatrixSymbol, Routine, RoutineOptions, Symbol, VarMap,
};

/// Evaluate a routine-side expression under `env`, or panic on a test bug.
fn eval(expr: &Expr, env: &HashMap<String, f64>) -> f64 {
  symgen::expr::eval(expr, env).unwrap()
}

/// Every local may only reference locals that appear strictly earlier.
fn assert_dependency_order(routine: &Routine) {
  let positions: HashMap<&str, usize> = routine
    .local_vars()
    .iter()
    .enumerate()
    .map(|(i, local)| (local.name.as_str(), i))
    .collect();
  for (i, local) in routine.local_vars().iter().enumerate() {
    for name in local.expr.free_symbols() {
      if let Some(&pos) = positions.get(name.as_str()) {
        assert!(
          pos < i,
          "local {} references {} which is not declared earlier",
          local.name,
          name
        );
      }
    }
  }
}

mod roundtrip {
  use super::*;

  #[test]
  fn forward_then_reverse_is_identity() {
    for (rows, cols) in [(1, 1), (2, 3), (6, 1), (4, 4), (6, 6)] {
      let matrix = MatrixSymbol::new("A", rows, cols);
      let map = VarMap::for_matrix(&matrix);

      let mut expr = Expr::sym("mu");
      for row in 0..rows {
        for col in 0..cols {
          let element = matrix.element(row, col);
          expr = expr
            + Expr::func("sin", vec![element.clone()]) * element.clone()
            + element.pow(Expr::int(3));
        }
      }

      let flattened = map.forward(&expr);
      assert_ne!(flattened, expr, "{}x{} map did not flatten", rows, cols);
      assert_eq!(map.reverse(&flattened), expr);
    }
  }

  #[test]
  fn reverse_then_forward_is_identity() {
    let matrix = MatrixSymbol::new("B", 3, 2);
    let map = VarMap::for_matrix(&matrix);
    let expr =
      Expr::sym("B4") * Expr::sym("B0") + Expr::sym("c") - Expr::sym("B5");
    assert_eq!(map.forward(&map.reverse(&expr)), expr);
  }

  #[test]
  fn placeholders_are_row_major() {
    let matrix = MatrixSymbol::new("A", 2, 3);
    let map = VarMap::for_matrix(&matrix);
    assert_eq!(map.forward(&matrix.element(0, 0)), Expr::sym("A0"));
    assert_eq!(map.forward(&matrix.element(1, 2)), Expr::sym("A5"));
    assert_eq!(map.reverse(&Expr::sym("A3")), matrix.element(1, 0));
  }
}

mod display {
  use super::*;

  #[test]
  fn nested_powers_print_right_associatively() {
    let x = Expr::sym("x");
    let y = Expr::sym("y");
    let z = Expr::sym("z");
    let left_nested = x.clone().pow(y.clone()).pow(z.clone());
    assert_eq!(left_nested.to_string(), "(x**y)**z");
    let right_nested = x.pow(y.pow(z));
    assert_eq!(right_nested.to_string(), "x**y**z");
  }
}

mod cse {
  use super::*;
  use symgen::cse::{CseOptions, CseResult};

  fn cse(exprs: &[Expr]) -> CseResult {
    symgen::cse::cse(exprs, &CseOptions::default())
  }

  fn test_env() -> HashMap<String, f64> {
    HashMap::from([
      ("a".to_string(), 1.3),
      ("b".to_string(), 0.7),
      ("c".to_string(), -2.1),
    ])
  }

  #[test]
  fn shared_subterm_extracted_once() {
    let a = Expr::sym("a");
    let b = Expr::sym("b");
    let shared = a.clone() + b.clone();
    let e1 = shared.clone() * Expr::sym("c") + shared.clone();
    let e2 = Expr::func("sin", vec![shared.clone()]) * shared.clone();

    let extracted = cse(&[e1, e2]);
    let hoisted: Vec<&Expr> =
      extracted.locals.iter().map(|(_, e)| e).collect();
    assert_eq!(
      hoisted.iter().filter(|e| ***e == shared).count(),
      1,
      "a + b should be hoisted exactly once"
    );
    for expr in &extracted.exprs {
      assert!(
        !contains_subtree(expr, &shared),
        "rewritten expression still repeats the shared subterm"
      );
    }
  }

  #[test]
  fn substituting_locals_reproduces_the_originals() {
    let a = Expr::sym("a");
    let b = Expr::sym("b");
    let q = (a.clone() + b.clone()).pow(Expr::int(2));
    let originals = vec![
      q.clone() * Expr::sym("c") + q.clone(),
      q.clone() - a.clone() * b.clone(),
      Expr::func("exp", vec![q.clone()]) + a.clone() * b.clone(),
    ];

    let extracted = cse(&originals);
    assert!(!extracted.locals.is_empty());

    let mut env = test_env();
    for (name, expr) in &extracted.locals {
      let value = eval(expr, &env);
      env.insert(name.clone(), value);
    }
    for (rewritten, original) in extracted.exprs.iter().zip(&originals) {
      let got = eval(rewritten, &env);
      let want = eval(original, &test_env());
      assert!(
        float_cmp::approx_eq!(f64, got, want, epsilon = 1e-12),
        "{} != {}",
        got,
        want
      );
    }
  }

  fn contains_subtree(expr: &Expr, needle: &Expr) -> bool {
    if expr == needle {
      return true;
    }
    expr.children().iter().any(|c| contains_subtree(c, needle))
  }
}

mod optimizer {
  use super::*;
  use symgen::optimize::{optimize, Optimizations};

  fn opt(expr: &Expr) -> Expr {
    optimize(expr, &Optimizations::default()).unwrap()
  }

  #[test]
  fn square_becomes_single_multiplication() {
    let x = Expr::sym("x");
    assert_eq!(
      opt(&x.clone().pow(Expr::int(2))),
      x.clone() * x.clone()
    );
  }

  #[test]
  fn cube_becomes_repeated_multiplication() {
    let x = Expr::sym("x");
    assert_eq!(
      opt(&x.clone().pow(Expr::int(3))),
      x.clone() * x.clone() * x.clone()
    );
  }

  #[test]
  fn function_bases_keep_the_power_form() {
    let sin_x = Expr::func("sin", vec![Expr::sym("x")]);
    let expr = sin_x.clone().pow(Expr::int(2));
    assert_eq!(opt(&expr), expr);
  }

  #[test]
  fn exponents_above_the_bound_keep_the_power_form() {
    let x = Expr::sym("x");
    let expr = x.pow(Expr::int(4));
    assert_eq!(opt(&expr), expr);
  }

  #[test]
  fn half_power_becomes_sqrt() {
    let x = Expr::sym("x");
    assert_eq!(
      opt(&x.clone().pow(Expr::real(0.5))),
      Expr::func("sqrt", vec![x])
    );
  }

  #[test]
  fn exp_minus_one_becomes_expm1() {
    let x = Expr::sym("x");
    let expr = Expr::func("exp", vec![x.clone()]) - Expr::int(1);
    assert_eq!(opt(&expr), Expr::func("expm1", vec![x]));
  }

  #[test]
  fn log_of_one_plus_becomes_log1p() {
    let x = Expr::sym("x");
    let expr = Expr::func("log", vec![Expr::int(1) + x.clone()]);
    assert_eq!(opt(&expr), Expr::func("log1p", vec![x]));
  }

  #[test]
  fn unknown_function_is_rejected() {
    let expr = Expr::func("gamma", vec![Expr::sym("x")]);
    let err = optimize(&expr, &Optimizations::default()).unwrap_err();
    assert!(matches!(err, CodegenError::UnsupportedForm(name) if name == "gamma"));
  }
}

mod differentiation {
  use super::*;
  use symgen::calculus::{differentiate, jacobian};

  #[test]
  fn polynomial_rule() {
    let x = Expr::sym("x");
    let expr = x.clone().pow(Expr::int(2)) + Expr::int(3) * x.clone();
    let d = differentiate(&expr, "x").unwrap();
    assert_eq!(d, Expr::int(2) * x + Expr::int(3));
  }

  #[test]
  fn product_rule_matches_closed_form() {
    let x = Expr::sym("x");
    let expr =
      Expr::func("sin", vec![x.clone()]) * Expr::func("exp", vec![x]);
    let d = differentiate(&expr, "x").unwrap();
    let env = HashMap::from([("x".to_string(), 0.9_f64)]);
    let want = 0.9_f64.cos() * 0.9_f64.exp() + 0.9_f64.sin() * 0.9_f64.exp();
    assert!(float_cmp::approx_eq!(
      f64,
      eval(&d, &env),
      want,
      epsilon = 1e-12
    ));
  }

  #[test]
  fn real_exponent_matches_finite_difference() {
    // d/dx (x^2 + 1)^(-1.5)
    let x = Expr::sym("x");
    let u = x.clone().pow(Expr::int(2)) + Expr::int(1);
    let expr = u.pow(Expr::real(-1.5));
    let d = differentiate(&expr, "x").unwrap();

    let f = |x: f64| (x * x + 1.0).powf(-1.5);
    let h = 1e-6;
    let want = (f(0.7 + h) - f(0.7 - h)) / (2.0 * h);
    let env = HashMap::from([("x".to_string(), 0.7_f64)]);
    assert!(float_cmp::approx_eq!(
      f64,
      eval(&d, &env),
      want,
      epsilon = 1e-6
    ));
  }

  #[test]
  fn jacobian_shape_and_entries() {
    let x = Expr::sym("x");
    let y = Expr::sym("y");
    let vec = ExprMatrix::from_column(vec![
      x.clone() * y.clone(),
      x.clone() + Expr::int(2) * y.clone(),
    ]);
    let jac = jacobian(&vec, &["x", "y"]).unwrap();
    assert_eq!((jac.rows(), jac.cols()), (2, 2));
    assert_eq!(*jac.get(0, 0), y);
    assert_eq!(*jac.get(0, 1), x);
    assert_eq!(*jac.get(1, 0), Expr::int(1));
    assert_eq!(*jac.get(1, 1), Expr::int(2));
  }
}

mod arguments {
  use super::*;

  #[test]
  fn inputs_precede_outputs_with_dimensions() {
    let s_mat = MatrixSymbol::new("S", 6, 1);
    let var_map = VarMap::for_matrix(&s_mat);

    let mu = Expr::sym("mu");
    let elems: Vec<Expr> = vec![
      Expr::sym("S3"),
      Expr::sym("S4"),
      Expr::sym("S5"),
      mu.clone() * Expr::sym("S0"),
      mu.clone() * Expr::sym("S1"),
      mu.clone() * Expr::sym("S2"),
    ];
    let eq = Equality::matrix(
      MatrixSymbol::new("dS", 6, 1),
      ExprMatrix::from_column(elems),
    )
    .unwrap();

    let mut options = RoutineOptions::new();
    options.var_map = var_map;
    let routine = make_routine(
      "dS_routine",
      &[
        InputSymbol::Matrix(s_mat),
        InputSymbol::Scalar(Symbol::positive("mu")),
      ],
      &[eq],
      &options,
    )
    .unwrap();

    let names: Vec<&str> =
      routine.arguments().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["S", "mu", "dS"]);

    let args = routine.arguments();
    assert_eq!(args[0].role, ArgRole::Input);
    assert_eq!(args[0].dimensions, Some(vec![(0, 5)]));
    assert_eq!(args[1].role, ArgRole::Input);
    assert_eq!(args[1].dimensions, None);
    assert_eq!(args[2].role, ArgRole::Output);
    assert_eq!(args[2].dimensions, Some(vec![(0, 5)]));
    assert!(args[2].expr.is_some());
  }

  #[test]
  fn locals_are_listed_in_dependency_order() {
    let a = Symbol::real("a");
    let b = Symbol::real("b");
    let sum = Expr::sym("a") + Expr::sym("b");
    let sq = sum.clone().pow(Expr::int(2));
    let expr = Expr::func("sin", vec![sq.clone()]) + sq.clone() * sum.clone()
      + sum.clone();
    let eq = Equality::scalar(Symbol::real("f"), expr).unwrap();

    let routine = make_routine(
      "nested_locals",
      &[InputSymbol::Scalar(a), InputSymbol::Scalar(b)],
      &[eq],
      &RoutineOptions::new(),
    )
    .unwrap();

    assert!(routine.local_vars().len() >= 2);
    assert_dependency_order(&routine);
  }

  #[test]
  fn disabling_cse_keeps_expressions_inline() {
    let a = Symbol::real("a");
    let shared = Expr::sym("a") * Expr::sym("a");
    let expr = shared.clone() + shared.clone();
    let eq = Equality::scalar(Symbol::real("f"), expr).unwrap();

    let mut options = RoutineOptions::new();
    options.cse = false;
    let routine = make_routine(
      "no_cse",
      &[InputSymbol::Scalar(a)],
      &[eq],
      &options,
    )
    .unwrap();
    assert!(routine.local_vars().is_empty());
  }

  #[test]
  fn result_expression_fills_the_result_slot() {
    let a = Symbol::real("a");
    let shared = Expr::sym("a").pow(Expr::int(2));
    let eq =
      Equality::scalar(Symbol::real("f"), shared.clone() + Expr::int(1))
        .unwrap();

    let mut options = RoutineOptions::new();
    options.result = Some(shared.clone() * Expr::int(2));
    let routine = make_routine(
      "with_result",
      &[InputSymbol::Scalar(a)],
      &[eq],
      &options,
    )
    .unwrap();

    assert!(routine.result().is_some());
    assert_eq!(routine.output_arguments().count(), 1);

    // The result and the output share a^2 through the same local
    let env = HashMap::from([("a".to_string(), 1.7_f64)]);
    let mut full_env = env.clone();
    for local in routine.local_vars() {
      let value = eval(&local.expr, &full_env);
      full_env.insert(local.name.clone(), value);
    }
    let result = eval(routine.result().unwrap(), &full_env);
    assert!(float_cmp::approx_eq!(
      f64,
      result,
      2.0 * 1.7 * 1.7,
      epsilon = 1e-12
    ));
  }
}

mod errors {
  use super::*;

  #[test]
  fn unbound_symbol_is_rejected() {
    let eq = Equality::scalar(
      Symbol::real("f"),
      Expr::sym("a") + Expr::sym("q"),
    )
    .unwrap();
    let err = make_routine(
      "unbound",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &RoutineOptions::new(),
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::UnboundSymbol(name) if name == "q"));
  }

  #[test]
  fn globals_bind_free_symbols() {
    let eq = Equality::scalar(
      Symbol::real("f"),
      Expr::sym("a") + Expr::sym("omega"),
    )
    .unwrap();
    let mut options = RoutineOptions::new();
    options.global_vars = vec!["omega".to_string()];
    let routine = make_routine(
      "with_global",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &options,
    )
    .unwrap();
    assert_eq!(routine.global_vars(), ["omega".to_string()]);
  }

  #[test]
  fn shape_mismatch_is_rejected() {
    let err = Equality::matrix(
      MatrixSymbol::new("out", 6, 1),
      ExprMatrix::from_column(vec![Expr::int(1), Expr::int(2)]),
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::ShapeMismatch { .. }));
  }

  #[test]
  fn result_without_cse_is_a_configuration_error() {
    let eq = Equality::scalar(Symbol::real("f"), Expr::sym("a")).unwrap();
    let mut options = RoutineOptions::new();
    options.cse = false;
    options.result = Some(Expr::sym("a"));
    let err = make_routine(
      "bad_config",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &options,
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::Config(_)));
  }

  #[test]
  fn invalid_routine_name_is_rejected() {
    let eq = Equality::scalar(Symbol::real("f"), Expr::sym("a")).unwrap();
    let err = make_routine(
      "3impossible",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &RoutineOptions::new(),
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::Config(_)));
  }

  #[test]
  fn unknown_function_aborts_assembly() {
    let eq = Equality::scalar(
      Symbol::real("f"),
      Expr::func("zeta", vec![Expr::sym("a")]),
    )
    .unwrap();
    let err = make_routine(
      "unknown_function",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &RoutineOptions::new(),
    )
    .unwrap_err();
    assert!(matches!(err, CodegenError::UnsupportedForm(name) if name == "zeta"));
  }
}

mod emission {
  use super::*;
  use symgen::codegen::C99CodeGen;

  fn sample_routine() -> Routine {
    let s_mat = MatrixSymbol::new("S", 2, 1);
    let var_map = VarMap::for_matrix(&s_mat);
    let eq = Equality::matrix(
      MatrixSymbol::new("dS", 2, 1),
      ExprMatrix::from_column(vec![
        Expr::sym("S1"),
        Expr::sym("mu") * Expr::sym("S0").pow(Expr::int(2)),
      ]),
    )
    .unwrap();
    let mut options = RoutineOptions::new();
    options.var_map = var_map;
    make_routine(
      "deriv",
      &[
        InputSymbol::Matrix(s_mat),
        InputSymbol::Scalar(Symbol::positive("mu")),
      ],
      &[eq],
      &options,
    )
    .unwrap()
  }

  #[test]
  fn source_has_signature_and_assignments() {
    let source = C99CodeGen::new()
      .render_source(&[sample_routine()], "deriv.h")
      .unwrap();
    assert!(source.contains("#include \"deriv.h\""));
    assert!(source.contains("#include <math.h>"));
    assert!(source.contains("void deriv(double *S, double mu, double *dS) {"));
    assert!(source.contains("dS[0] = S[1];"));
    assert!(source.contains("dS[1] = mu*S[0]*S[0];"));
  }

  #[test]
  fn header_has_guard_and_prototype() {
    let header = C99CodeGen::new().render_header(&[sample_routine()], "deriv");
    assert!(header.contains("#ifndef DERIV_H"));
    assert!(header.contains("#define DERIV_H"));
    assert!(header
      .contains("void deriv(double *S, double mu, double *dS);"));
    assert!(header.contains("#endif"));
  }

  #[test]
  fn integer_quotients_are_emitted_as_real_division() {
    let eq = Equality::scalar(
      Symbol::real("f"),
      Expr::int(1) / Expr::int(2) * Expr::sym("a"),
    )
    .unwrap();
    let routine = make_routine(
      "halve",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &RoutineOptions::new(),
    )
    .unwrap();
    let source =
      C99CodeGen::new().render_source(&[routine], "halve.h").unwrap();
    assert!(source.contains("*f = 1.0/2.0*a;"));

    // The emitted text now agrees with the evaluator's real division
    let env = HashMap::from([("a".to_string(), 3.0_f64)]);
    let value = eval(&(Expr::int(1) / Expr::int(2) * Expr::sym("a")), &env);
    assert!(float_cmp::approx_eq!(f64, value, 1.5, epsilon = 1e-12));
  }

  #[test]
  fn scalar_outputs_are_assigned_through_pointers() {
    let eq = Equality::scalar(
      Symbol::real("f"),
      Expr::sym("a") + Expr::int(1),
    )
    .unwrap();
    let routine = make_routine(
      "scalar_out",
      &[InputSymbol::Scalar(Symbol::real("a"))],
      &[eq],
      &RoutineOptions::new(),
    )
    .unwrap();
    let source =
      C99CodeGen::new().render_source(&[routine], "scalar_out.h").unwrap();
    assert!(source.contains("void scalar_out(double a, double *f) {"));
    assert!(source.contains("*f = a + 1;"));
  }
}
