//! Triangular solve and multiply through the dispatch layer.

mod common;

use common::{
    assert_allclose_f64, create_cpu_client, random_f64, reference_matmul, tolerance, transposed,
    triangle,
};
use linalg_dispatch::dtype::DType;
use linalg_dispatch::error::Error;
use linalg_dispatch::linalg::{linalg_trmm, linalg_trsm, transpose};
use linalg_dispatch::runtime::cpu::CpuRuntime;
use linalg_dispatch::tensor::Tensor;

/// Well-conditioned square matrix: random off-diagonal, diagonal in [2, 3)
fn well_conditioned(n: usize, seed: u64) -> Vec<f64> {
    let mut a = random_f64(n * n, seed);
    for i in 0..n {
        a[i * n + i] = 2.0 + a[i * n + i].abs();
    }
    a
}

// ============================================================================
// trsm
// ============================================================================

#[test]
fn test_trsm_lower_left_known_values() {
    let (client, device) = create_cpu_client();
    // A = [[2, 0], [1, 4]], A X = B with X = [[1, 2], [1, 2]]
    let a = Tensor::<CpuRuntime>::from_slice(&[2.0f64, 0.0, 1.0, 4.0], &[2, 2], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&[2.0f64, 4.0, 5.0, 10.0], &[2, 2], &device);

    linalg_trsm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap();
    assert_allclose_f64(&b.to_vec::<f64>(), &[1.0, 2.0, 1.0, 2.0], 1e-12, 1e-12, "trsm");
}

#[test]
fn test_trsm_ignores_opposite_triangle() {
    let (client, device) = create_cpu_client();
    // Garbage above the diagonal must not be read for a lower solve
    let a = Tensor::<CpuRuntime>::from_slice(&[2.0f64, f64::NAN, 1.0, 4.0], &[2, 2], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&[2.0f64, 4.0, 5.0, 10.0], &[2, 2], &device);

    linalg_trsm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap();
    assert_allclose_f64(&b.to_vec::<f64>(), &[1.0, 2.0, 1.0, 2.0], 1e-12, 1e-12, "trsm");
}

/// `op(A) X = alpha B` (left) or `X op(A) = alpha B` (right) checked by
/// multiplying the solution back out
fn check_trsm(lower: bool, right: bool, trans: bool) {
    let (client, device) = create_cpu_client();
    let (m, n) = (4, 3);
    let order = if right { n } else { m };
    let a_data = well_conditioned(order, 7);
    let b_data = random_f64(m * n, 8);
    let alpha = 1.5;

    let a = Tensor::<CpuRuntime>::from_slice(&a_data, &[order, order], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&b_data, &[m, n], &device);
    let a_op = if trans { transpose(&a) } else { (&a).into() };
    linalg_trsm(a_op, &mut b, alpha, right, lower, Some(&client)).unwrap();
    let x = b.to_vec::<f64>();

    let tri = triangle(&a_data, order, lower);
    let op_a = if trans {
        transposed(&tri, order, order)
    } else {
        tri
    };
    let back = if right {
        reference_matmul(&x, (m, n), false, &op_a, (n, n), false)
    } else {
        reference_matmul(&op_a, (m, m), false, &x, (m, n), false)
    };
    let expected: Vec<f64> = b_data.iter().map(|v| alpha * v).collect();
    assert_allclose_f64(
        &back,
        &expected,
        1e-10,
        1e-10,
        &format!("trsm lower={lower} right={right} trans={trans}"),
    );
}

#[test]
fn test_trsm_all_combinations() {
    for lower in [true, false] {
        for right in [false, true] {
            for trans in [false, true] {
                check_trsm(lower, right, trans);
            }
        }
    }
}

#[test]
fn test_trsm_f32() {
    let (client, device) = create_cpu_client();
    let a = Tensor::<CpuRuntime>::from_slice(&[2.0f32, 1.0, 0.0, 4.0], &[2, 2], &device);
    // Upper A = [[2, 1], [0, 4]]; X A = B with X = [[1, 1]]
    let mut b = Tensor::<CpuRuntime>::from_slice(&[2.0f32, 5.0], &[1, 2], &device);

    linalg_trsm(&a, &mut b, 1.0f32, true, false, Some(&client)).unwrap();
    assert_eq!(b.to_vec::<f32>(), [1.0, 1.0]);
}

// ============================================================================
// trmm
// ============================================================================

fn check_trmm(lower: bool, right: bool, trans: bool) {
    let (client, device) = create_cpu_client();
    let (m, n) = (3, 5);
    let order = if right { n } else { m };
    let a_data = random_f64(order * order, 11);
    let b_data = random_f64(m * n, 12);
    let alpha = -0.5;

    let a = Tensor::<CpuRuntime>::from_slice(&a_data, &[order, order], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&b_data, &[m, n], &device);
    let a_op = if trans { transpose(&a) } else { (&a).into() };
    linalg_trmm(a_op, &mut b, alpha, right, lower, Some(&client)).unwrap();

    let tri = triangle(&a_data, order, lower);
    let op_a = if trans {
        transposed(&tri, order, order)
    } else {
        tri
    };
    let product = if right {
        reference_matmul(&b_data, (m, n), false, &op_a, (n, n), false)
    } else {
        reference_matmul(&op_a, (m, m), false, &b_data, (m, n), false)
    };
    let expected: Vec<f64> = product.iter().map(|v| alpha * v).collect();
    let (rtol, atol) = tolerance(DType::F64);
    assert_allclose_f64(
        &b.to_vec::<f64>(),
        &expected,
        rtol,
        atol,
        &format!("trmm lower={lower} right={right} trans={trans}"),
    );
}

#[test]
fn test_trmm_all_combinations() {
    for lower in [true, false] {
        for right in [false, true] {
            for trans in [false, true] {
                check_trmm(lower, right, trans);
            }
        }
    }
}

#[test]
fn test_trmm_then_trsm_restores_b() {
    let (client, device) = create_cpu_client();
    let a_data = well_conditioned(4, 21);
    let b_data = random_f64(4 * 2, 22);
    let a = Tensor::<CpuRuntime>::from_slice(&a_data, &[4, 4], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&b_data, &[4, 2], &device);

    linalg_trmm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap();
    linalg_trsm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap();
    assert_allclose_f64(&b.to_vec::<f64>(), &b_data, 1e-12, 1e-12, "round trip");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_triangular_non_square_a() {
    let (client, device) = create_cpu_client();
    let a = Tensor::<CpuRuntime>::from_slice(&[1.0f64; 6], &[2, 3], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&[3.0f64; 4], &[2, 2], &device);

    let err = linalg_trsm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }), "{err}");
    assert_eq!(b.to_vec::<f64>(), [3.0; 4]);
}

#[test]
fn test_triangular_order_must_match_side() {
    let (client, device) = create_cpu_client();
    let a = Tensor::<CpuRuntime>::from_slice(&[1.0f64; 9], &[3, 3], &device);
    let mut b = Tensor::<CpuRuntime>::from_slice(&[1.0f64; 6], &[2, 3], &device);

    // Left side needs A of order rows(B) = 2
    let err = linalg_trmm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap_err();
    assert!(err.is_shape(), "{err}");

    // Right side needs order cols(B) = 3
    linalg_trmm(&a, &mut b, 1.0f64, true, true, Some(&client)).unwrap();
}

#[test]
fn test_trsm_on_column_blocks_of_one_buffer() {
    let (client, device) = create_cpu_client();
    // [A | B] side by side: A = [[2, 0], [1, 4]], B = [[2, 4], [5, 10]]
    let base = Tensor::<CpuRuntime>::from_slice(
        &[2.0f64, 0.0, 2.0, 4.0, 1.0, 4.0, 5.0, 10.0],
        &[2, 4],
        &device,
    );
    let a = base.narrow(1, 0, 2).unwrap();
    let mut b = base.narrow(1, 2, 2).unwrap();

    linalg_trsm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap();
    assert_eq!(b.to_vec::<f64>(), [1.0, 2.0, 1.0, 2.0]);
    assert_eq!(base.to_vec::<f64>(), [2.0, 0.0, 1.0, 2.0, 1.0, 4.0, 1.0, 2.0]);

    // A block that shares columns with A is still rejected
    let mut overlapping = base.narrow(1, 1, 2).unwrap();
    let err = linalg_trmm(&a, &mut overlapping, 1.0f64, false, true, Some(&client)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "b", .. }), "{err}");
}

#[test]
fn test_triangular_b_aliasing_a() {
    let (client, device) = create_cpu_client();
    let a = Tensor::<CpuRuntime>::from_slice(&[1.0f64, 0.0, 0.0, 1.0], &[2, 2], &device);
    let mut b = a.clone();

    let err = linalg_trsm(&a, &mut b, 1.0f64, false, true, Some(&client)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "b", .. }), "{err}");
}
