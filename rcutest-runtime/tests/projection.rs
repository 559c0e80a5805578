use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};
use rcutest_runtime::IndexProjection;
use rcutest_structs::{Error, SparseTriplet, SparseVec};

fn fixture() -> IndexProjection {
    // variables 0 and 3 are fixed at their bounds
    let bl = array![1.0, -2.0, 0.0, 4.0, -1e20];
    let bu = array![1.0, 5.0, 3.0, 4.0, 1e20];
    IndexProjection::from_bounds(&bl, &bu).unwrap()
}

#[test]
fn test_fixed_detection() {
    let p = fixture();
    assert_eq!(p.n_full(), 5);
    assert_eq!(p.n_free(), 3);
    assert_eq!(p.n_fixed(), 2);
    assert_eq!(p.idx_free(), &[1, 2, 4]);
    assert_eq!(p.idx_fixed(), &[0, 3]);
    assert!(!p.is_identity());
}

#[test]
fn test_shrink_selects_free_entries() {
    let p = fixture();
    let full = array![10.0, 11.0, 12.0, 13.0, 14.0];
    assert_eq!(p.shrink(&full).unwrap(), array![11.0, 12.0, 14.0]);
}

#[test]
fn test_expand_with_zeros_and_fill() {
    let p = fixture();
    let free = array![11.0, 12.0, 14.0];
    assert_eq!(
        p.expand(&free, false).unwrap(),
        array![0.0, 11.0, 12.0, 0.0, 14.0]
    );
    // fill values are the fixed variables' bound values
    assert_eq!(
        p.expand(&free, true).unwrap(),
        array![1.0, 11.0, 12.0, 4.0, 14.0]
    );
}

#[test]
fn test_roundtrip_zeroes_fixed_positions() {
    let p = fixture();
    let v = array![9.0, 1.0, 2.0, 9.0, 3.0];
    let roundtrip = p.expand(&p.shrink(&v).unwrap(), false).unwrap();
    assert_eq!(roundtrip, array![0.0, 1.0, 2.0, 0.0, 3.0]);
}

#[test]
fn test_roundtrip_exact_when_fixed_at_bounds() {
    let p = fixture();
    // fixed entries already carry their bound values
    let v = array![1.0, 1.5, 2.5, 4.0, 3.5];
    let roundtrip = p.expand(&p.shrink(&v).unwrap(), true).unwrap();
    assert_eq!(roundtrip, v);
}

#[test]
fn test_shrink_matrix_cols() {
    let p = fixture();
    let full = Array2::from_shape_fn((2, 5), |(i, j)| (i * 10 + j) as f64);
    let reduced = p.shrink_matrix_cols(&full).unwrap();
    assert_eq!(reduced, array![[1.0, 2.0, 4.0], [11.0, 12.0, 14.0]]);
}

#[test]
fn test_shrink_matrix_rows_and_cols() {
    let p = fixture();
    let full = Array2::from_shape_fn((5, 5), |(i, j)| (i * 10 + j) as f64);
    let reduced = p.shrink_matrix_rows_and_cols(&full).unwrap();
    assert_eq!(
        reduced,
        array![[11.0, 12.0, 14.0], [21.0, 22.0, 24.0], [41.0, 42.0, 44.0]]
    );
}

#[test]
fn test_shrink_sparse_vec_reindexes() {
    let p = fixture();
    let v = SparseVec::new(5, vec![0, 1, 4], vec![7.0, 8.0, 9.0]);
    let reduced = p.shrink_sparse_vec(&v).unwrap();
    assert_eq!(reduced.len, 3);
    assert_eq!(reduced.indices, vec![0, 2]);
    assert_eq!(reduced.values, vec![8.0, 9.0]);
}

#[test]
fn test_shrink_triplet_cols() {
    let p = fixture();
    let t = SparseTriplet::new(
        (2, 5),
        vec![0, 0, 1, 1],
        vec![0, 2, 3, 4],
        vec![1.0, 2.0, 3.0, 4.0],
    );
    let reduced = p.shrink_triplet_cols(&t).unwrap();
    assert_eq!(reduced.shape, (2, 3));
    assert_eq!(reduced.rows, vec![0, 1]);
    assert_eq!(reduced.cols, vec![1, 2]);
    assert_eq!(reduced.values, vec![2.0, 4.0]);
}

#[test]
fn test_sparse_dense_shrink_consistency() {
    let p = fixture();
    // symmetric 5x5 Hessian with entries touching fixed and free variables
    let t = SparseTriplet::from_upper_triangle(
        5,
        vec![0, 0, 1, 1, 2, 4],
        vec![0, 1, 1, 4, 2, 4],
        vec![2.0, -1.0, 3.0, 0.5, 1.0, 4.0],
    );
    let dense = t.to_dense();

    let sparse_reduced = p.shrink_triplet_rows_and_cols(&t).unwrap();
    let dense_reduced = p.shrink_matrix_rows_and_cols(&dense).unwrap();

    let densified = sparse_reduced.to_dense();
    assert_eq!(densified.dim(), dense_reduced.dim());
    for i in 0..densified.nrows() {
        for j in 0..densified.ncols() {
            assert_abs_diff_eq!(densified[[i, j]], dense_reduced[[i, j]]);
        }
    }
}

#[test]
fn test_duplicate_triplet_entries_preserved() {
    let p = fixture();
    let t = SparseTriplet::new((5, 5), vec![1, 1], vec![2, 2], vec![1.0, 2.0]);
    let reduced = p.shrink_triplet_rows_and_cols(&t).unwrap();
    // both entries survive as distinct triplets
    assert_eq!(reduced.nnz(), 2);
    assert_eq!(reduced.values, vec![1.0, 2.0]);
}

#[test]
fn test_identity_projection() {
    let p = IndexProjection::identity(4);
    assert!(p.is_identity());
    assert_eq!(p.n_free(), 4);
    assert_eq!(p.n_fixed(), 0);
    let v = array![1.0, 2.0, 3.0, 4.0];
    assert_eq!(p.shrink(&v).unwrap(), v);
    assert_eq!(p.expand(&v, true).unwrap(), v);
}

#[test]
fn test_shape_mismatch_rejected() {
    let p = fixture();
    let wrong = Array1::zeros(4);
    match p.shrink(&wrong).unwrap_err() {
        Error::Shape { expected, got, .. } => {
            assert_eq!(expected, 5);
            assert_eq!(got, 4);
        }
        other => panic!("expected shape error, got {:?}", other),
    }
    assert!(p.expand(&Array1::zeros(5), false).is_err());
    assert!(p
        .shrink_matrix_rows_and_cols(&Array2::zeros((4, 5)))
        .is_err());
}
