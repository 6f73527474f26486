//! Cholesky factorization and inversion through the dispatch layer.

mod common;

use common::{assert_allclose_f64, create_cpu_client, reference_matmul, spd_matrix, transposed, triangle};
use linalg_dispatch::error::Error;
use linalg_dispatch::linalg::{linalg_potrf, linalg_potri, linalg_syrk, transpose};
use linalg_dispatch::runtime::cpu::CpuRuntime;
use linalg_dispatch::tensor::Tensor;

// ============================================================================
// potrf
// ============================================================================

#[test]
fn test_potrf_known_factor() {
    let (client, device) = create_cpu_client();
    // [[4, 2], [2, 3]] = L Lᵀ with L = [[2, 0], [1, sqrt(2)]]
    let mut a = Tensor::<CpuRuntime>::from_slice(&[4.0f64, 2.0, 2.0, 3.0], &[2, 2], &device);

    linalg_potrf(&mut a, true, Some(&client)).unwrap();
    let l = triangle(&a.to_vec::<f64>(), 2, true);
    assert_allclose_f64(&l, &[2.0, 0.0, 1.0, 2f64.sqrt()], 1e-14, 1e-14, "L");
}

#[test]
fn test_potrf_reconstructs_lower_and_upper() {
    let (client, device) = create_cpu_client();
    let n = 6;
    let spd = spd_matrix(n, 3);

    for lower in [true, false] {
        let mut a = Tensor::<CpuRuntime>::from_slice(&spd, &[n, n], &device);
        linalg_potrf(&mut a, lower, Some(&client)).unwrap();
        let f = triangle(&a.to_vec::<f64>(), n, lower);
        let ft = transposed(&f, n, n);
        // A = L Lᵀ or A = Uᵀ U
        let back = if lower {
            reference_matmul(&f, (n, n), false, &ft, (n, n), false)
        } else {
            reference_matmul(&ft, (n, n), false, &f, (n, n), false)
        };
        assert_allclose_f64(&back, &spd, 1e-12, 1e-12, &format!("lower={lower}"));
    }
}

#[test]
fn test_potrf_reads_only_requested_triangle() {
    let (client, device) = create_cpu_client();
    let mut a = Tensor::<CpuRuntime>::from_slice(&[4.0f64, f64::NAN, 2.0, 3.0], &[2, 2], &device);

    linalg_potrf(&mut a, true, Some(&client)).unwrap();
    let out = a.to_vec::<f64>();
    assert_eq!(out[0], 2.0);
    assert_eq!(out[2], 1.0);
}

#[test]
fn test_potrf_not_positive_definite() {
    let (client, device) = create_cpu_client();
    // Second leading minor: 1*1 - 2*2 < 0
    let mut a = Tensor::<CpuRuntime>::from_slice(&[1.0f64, 2.0, 2.0, 1.0], &[2, 2], &device);

    let err = linalg_potrf(&mut a, true, Some(&client)).unwrap_err();
    assert!(
        matches!(err, Error::NotPositiveDefinite { op: "potrf", order: 2 }),
        "{err}"
    );
    assert!(err.is_numerical());
}

#[test]
fn test_potrf_negative_diagonal_fails_at_first_minor() {
    let (client, device) = create_cpu_client();
    let mut a = Tensor::<CpuRuntime>::from_slice(&[-1.0f32, 0.0, 0.0, 1.0], &[2, 2], &device);

    let err = linalg_potrf(&mut a, false, Some(&client)).unwrap_err();
    assert!(
        matches!(err, Error::NotPositiveDefinite { order: 1, .. }),
        "{err}"
    );
}

#[test]
fn test_potrf_non_square() {
    let (client, device) = create_cpu_client();
    let mut a = Tensor::<CpuRuntime>::from_slice(&[1.0f64; 6], &[2, 3], &device);

    let err = linalg_potrf(&mut a, true, Some(&client)).unwrap_err();
    assert!(err.is_shape(), "{err}");
    assert_eq!(a.to_vec::<f64>(), [1.0; 6]);
}

// ============================================================================
// potri
// ============================================================================

#[test]
fn test_potri_known_inverse() {
    let (client, device) = create_cpu_client();
    // inv([[4, 2], [2, 3]]) = [[3, -2], [-2, 4]] / 8
    let mut a = Tensor::<CpuRuntime>::from_slice(&[4.0f64, 2.0, 2.0, 3.0], &[2, 2], &device);

    linalg_potrf(&mut a, true, Some(&client)).unwrap();
    linalg_potri(&mut a, true, Some(&client)).unwrap();
    let inv = a.to_vec::<f64>();
    assert_allclose_f64(&[inv[0], inv[2], inv[3]], &[0.375, -0.25, 0.5], 1e-14, 1e-14, "inverse");
}

#[test]
fn test_potri_inverse_both_triangles() {
    let (client, device) = create_cpu_client();
    let n = 5;
    let spd = spd_matrix(n, 9);

    for lower in [true, false] {
        let mut a = Tensor::<CpuRuntime>::from_slice(&spd, &[n, n], &device);
        linalg_potrf(&mut a, lower, Some(&client)).unwrap();
        linalg_potri(&mut a, lower, Some(&client)).unwrap();

        // Symmetrize from the computed triangle and check A * inv(A) = I
        let tri = a.to_vec::<f64>();
        let mut inv = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let (r, c) = if (i >= j) == lower { (i, j) } else { (j, i) };
                inv[i * n + j] = tri[r * n + c];
            }
        }
        let eye = reference_matmul(&spd, (n, n), false, &inv, (n, n), false);
        let expected: Vec<f64> = (0..n * n)
            .map(|i| if i / n == i % n { 1.0 } else { 0.0 })
            .collect();
        assert_allclose_f64(&eye, &expected, 1e-10, 1e-10, &format!("lower={lower}"));
    }
}

#[test]
fn test_potri_zero_diagonal_leaves_a_unchanged() {
    let (client, device) = create_cpu_client();
    let data = [2.0f64, 0.0, 1.0, 0.0];
    let mut a = Tensor::<CpuRuntime>::from_slice(&data, &[2, 2], &device);

    let err = linalg_potri(&mut a, true, Some(&client)).unwrap_err();
    assert!(
        matches!(err, Error::NotPositiveDefinite { op: "potri", order: 2 }),
        "{err}"
    );
    assert_eq!(a.to_vec::<f64>(), data);
}

// ============================================================================
// syrk
// ============================================================================

#[test]
fn test_syrk_matches_gemm() {
    let (client, device) = create_cpu_client();
    let a_data = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let a = Tensor::<CpuRuntime>::from_slice(&a_data, &[2, 3], &device);

    // A Aᵀ (2x2)
    let mut c = Tensor::<CpuRuntime>::from_slice(&[f64::NAN; 4], &[2, 2], &device);
    linalg_syrk(&a, &mut c, 1.0f64, 0.0, Some(&client)).unwrap();
    assert_eq!(c.to_vec::<f64>(), [14.0, 32.0, 32.0, 77.0]);

    // Aᵀ A (3x3), accumulated onto the identity
    let mut c = Tensor::<CpuRuntime>::from_slice(
        &[1.0f64, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        &[3, 3],
        &device,
    );
    linalg_syrk(transpose(&a), &mut c, 1.0f64, 1.0, Some(&client)).unwrap();
    let expected = reference_matmul(&a_data, (2, 3), true, &a_data, (2, 3), false);
    let expected: Vec<f64> = expected
        .iter()
        .enumerate()
        .map(|(i, v)| if i % 4 == 0 { v + 1.0 } else { *v })
        .collect();
    assert_allclose_f64(&c.to_vec::<f64>(), &expected, 1e-14, 1e-14, "AᵀA + I");
}

#[test]
fn test_syrk_then_potrf() {
    let (client, device) = create_cpu_client();
    // Full-row-rank A gives a positive definite A Aᵀ
    let a = Tensor::<CpuRuntime>::from_slice(&[2.0f64, 0.0, 1.0, 0.0, 3.0, 1.0], &[2, 3], &device);
    let mut c = Tensor::<CpuRuntime>::zeros(&[2, 2], linalg_dispatch::dtype::DType::F64, &device);

    linalg_syrk(&a, &mut c, 1.0f64, 0.0, Some(&client)).unwrap();
    linalg_potrf(&mut c, true, Some(&client)).unwrap();
}

#[test]
fn test_syrk_output_must_be_square_of_op_rows() {
    let (client, device) = create_cpu_client();
    let a = Tensor::<CpuRuntime>::from_slice(&[1.0f64; 6], &[2, 3], &device);
    let mut c = Tensor::<CpuRuntime>::zeros(&[3, 3], linalg_dispatch::dtype::DType::F64, &device);

    let err = linalg_syrk(&a, &mut c, 1.0f64, 0.0, Some(&client)).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }), "{err}");
}
