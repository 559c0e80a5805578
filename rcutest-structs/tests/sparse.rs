use approx::assert_abs_diff_eq;
use ndarray::array;
use rcutest_structs::{SparseTriplet, SparseVec};

#[test]
fn test_sparse_vec_to_dense() {
    let v = SparseVec::new(5, vec![0, 3], vec![1.5, -2.0]);
    assert_eq!(v.nnz(), 2);
    assert_eq!(v.to_dense(), array![1.5, 0.0, 0.0, -2.0, 0.0]);
}

#[test]
fn test_sparse_vec_duplicates_sum_on_densify() {
    let v = SparseVec::new(3, vec![1, 1], vec![2.0, 3.0]);
    assert_eq!(v.to_dense(), array![0.0, 5.0, 0.0]);
}

#[test]
fn test_triplet_to_dense() {
    let t = SparseTriplet::new((2, 3), vec![0, 1, 1], vec![2, 0, 2], vec![1.0, 2.0, 3.0]);
    assert_eq!(
        t.to_dense(),
        array![[0.0, 0.0, 1.0], [2.0, 0.0, 3.0]]
    );
}

#[test]
fn test_upper_triangle_mirroring() {
    // Upper triangle of [[4, 1, 0], [1, 5, 2], [0, 2, 6]]
    let t = SparseTriplet::from_upper_triangle(
        3,
        vec![0, 0, 1, 1, 2],
        vec![0, 1, 1, 2, 2],
        vec![4.0, 1.0, 5.0, 2.0, 6.0],
    );
    // 5 entries, 3 on the diagonal: 2 * 5 - 3 mirrored entries
    assert_eq!(t.nnz(), 7);
    let dense = t.to_dense();
    let expected = array![[4.0, 1.0, 0.0], [1.0, 5.0, 2.0], [0.0, 2.0, 6.0]];
    for i in 0..3 {
        for j in 0..3 {
            assert_abs_diff_eq!(dense[[i, j]], expected[[i, j]]);
            assert_abs_diff_eq!(dense[[i, j]], dense[[j, i]]);
        }
    }
}

#[test]
fn test_upper_triangle_diagonal_only() {
    let t = SparseTriplet::from_upper_triangle(2, vec![0, 1], vec![0, 1], vec![1.0, 2.0]);
    assert_eq!(t.nnz(), 2);
    assert_eq!(t.to_dense(), array![[1.0, 0.0], [0.0, 2.0]]);
}
