extern crate nalgebra as na;

use approx::assert_abs_diff_eq;
use sparsefit_core::{
    GeneralizedLasso,
    path::{PathConfig, admm_path, alpha_grid},
    transform::TransformMatrix,
    utils::soft_threshold_vec,
};

/// Well-conditioned 20 × 4 design with a sparse generating model.
fn path_design() -> (na::DMatrix<f64>, na::DVector<f64>) {
    let x = na::DMatrix::from_fn(20, 4, |i, j| {
        let bump = if i % 4 == j { 1.0 } else { 0.0 };
        (0.7 * i as f64 * (j + 1) as f64 + 0.3 * j as f64).sin() + bump
    });
    let w_true = na::DVector::from_vec(vec![1.5, 0.0, -2.0, 0.5]);
    (x, w_true)
}

#[test]
fn small_problem_reaches_lasso_optimum() {
    let x = na::DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    let y = na::DVector::from_vec(vec![1.0, 1.0, 2.0]);

    let fit = GeneralizedLasso::lasso(0.01)
        .with_rho(1.0)
        .with_tol(1e-6)
        .with_max_iter(500)
        .fit_vector(&x, &y)
        .unwrap();

    // Exact optimum of the penalized problem, one alpha * n below the noiseless [1, 1]
    let expected = na::DVector::from_vec(vec![0.99, 0.99]);
    assert_abs_diff_eq!(fit.coef_vector(), expected, epsilon = 1e-4);
    for w in fit.coef.iter() {
        assert!((w - 1.0).abs() <= 1e-2 + 1e-12);
    }
    assert!(fit.n_iter[0] < 499);
}

#[test]
fn orthogonal_design_matches_soft_threshold() {
    let x = na::DMatrix::<f64>::identity(4, 4);
    let y = na::DVector::from_vec(vec![3.0, -2.0, 0.5, 1.0]);

    let fit = GeneralizedLasso::lasso(0.25)
        .with_tol(1e-12)
        .with_max_iter(10_000)
        .fit_vector(&x, &y)
        .unwrap();

    // 1/(2n) ||y - w||^2 + alpha ||w||_1 is minimized by S(y, n * alpha)
    let expected = soft_threshold_vec(&y, 4.0 * 0.25);
    assert_abs_diff_eq!(fit.coef_vector(), expected, epsilon = 1e-5);
}

#[test]
fn small_penalty_recovers_generating_coefficients() {
    let (x, w_true) = path_design();
    let y = &x * &w_true;

    let fit = GeneralizedLasso::lasso(1e-5)
        .with_tol(1e-10)
        .with_max_iter(5000)
        .fit_vector(&x, &y)
        .unwrap();
    assert_abs_diff_eq!(fit.coef_vector(), w_true, epsilon = 1e-2);
}

#[test]
fn path_shrinks_towards_zero_as_alpha_grows() {
    let (x, w_true) = path_design();
    let y = na::DMatrix::from_column_slice(20, 1, (&x * &w_true).as_slice());
    let config = PathConfig {
        n_alphas: 5,
        eps: 1e-3,
        rho: 1.0,
        tol: 1e-6,
        max_iter: 1000,
        ..PathConfig::default()
    };

    let path = admm_path(&x, &y, &config).unwrap();
    assert_eq!(path.alphas, alpha_grid(&x, &y, 1e-3, 5).unwrap());
    for pair in path.alphas.windows(2) {
        assert!(pair[0] > pair[1]);
    }

    let norms = path.l1_norms();
    assert!(norms[0] < 1e-2, "coefficients at alpha_max: {}", norms[0]);
    for pair in norms.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-3, "l1 norms not increasing: {norms:?}");
    }
    assert_abs_diff_eq!(
        path.coef_matrix(0).unwrap().column(4).clone_owned(),
        w_true,
        epsilon = 2e-2
    );
}

#[test]
fn banded_and_dense_updates_agree() {
    let x = na::DMatrix::<f64>::identity(6, 6);
    let y = na::DVector::from_vec(vec![1.0, 1.2, 0.9, -0.5, -0.4, -0.6]);

    let model = GeneralizedLasso::fused(0.05, 1.0, 1.0)
        .with_tol(1e-10)
        .with_max_iter(2000);
    let dense = model.fit_vector(&x, &y).unwrap();
    let banded = model.with_banded(true).fit_vector(&x, &y).unwrap();

    assert_abs_diff_eq!(dense.coef, banded.coef, epsilon = 1e-8);
}

#[test]
fn multi_target_fit_matches_individual_fits() {
    let (x, _) = path_design();
    let y = na::DMatrix::from_fn(20, 3, |i, k| ((i + 3 * k) as f64 * 0.41).cos());
    let model = GeneralizedLasso::fused(0.02, 1.0, 0.5).with_tol(1e-8);

    let joint = model.fit(&x, &y).unwrap();
    assert_eq!(joint.coef.shape(), (4, 3));
    assert_eq!(joint.n_iter.len(), 3);

    for k in 0..3 {
        let single = model.fit_vector(&x, &y.column(k).clone_owned()).unwrap();
        assert_abs_diff_eq!(
            joint.coef.column(k).clone_owned(),
            single.coef_vector(),
            epsilon = 1e-12
        );
        assert_eq!(joint.n_iter[k], single.n_iter[0]);
    }

    let targets: Vec<usize> = joint.timings.records().iter().map(|r| r.target).collect();
    assert!(targets.contains(&2));
}

#[test]
fn trend_filtering_does_not_increase_penalty() {
    let n = 8;
    let x = na::DMatrix::<f64>::identity(n, n);
    let y = na::DVector::from_fn(n, |i, _| {
        let t = i as f64;
        let base = if i < 4 { t } else { 6.0 - 0.5 * t };
        base + if i % 2 == 0 { 0.1 } else { -0.1 }
    });

    let model = GeneralizedLasso::trend_filtering(0.1, 1)
        .with_tol(1e-10)
        .with_max_iter(5000);
    let fit = model.fit_vector(&x, &y).unwrap();

    let d = TransformMatrix::TrendFiltering { margin: 1 }.generate(n);
    let penalty_fit = (&d * fit.coef_vector()).lp_norm(1);
    let penalty_y = (&d * &y).lp_norm(1);
    assert!(penalty_fit <= penalty_y + 1e-3);
    assert!(fit.coef.iter().all(|v| v.is_finite()));
}

#[test]
fn zero_iterations_report_index_zero() {
    let x = na::DMatrix::<f64>::identity(3, 3);
    let y = na::DVector::from_vec(vec![1.0, 2.0, 3.0]);
    let fit = GeneralizedLasso::lasso(0.1)
        .with_max_iter(0)
        .fit_vector(&x, &y)
        .unwrap();
    assert_eq!(fit.n_iter, vec![0]);
}

#[cfg(feature = "linfa")]
#[test]
fn agrees_with_coordinate_descent() {
    use sparsefit_core::utils::reference_lasso_linfa;

    let (x, w_true) = path_design();
    let y = &x * &w_true;
    let alpha = 0.05;

    let admm = GeneralizedLasso::lasso(alpha)
        .with_tol(1e-10)
        .with_max_iter(10_000)
        .fit_vector(&x, &y)
        .unwrap();
    let reference = reference_lasso_linfa(&x, &y, alpha).unwrap();
    assert_abs_diff_eq!(admm.coef_vector(), reference, epsilon = 5e-3);
}
