use crate::{EvaluatorBinding, IndexProjection};
use ndarray::{Array1, Array2};
use rcutest_structs::{
    CacheKey, ConstraintData, Error, ProblemInfo, Result, SparseTriplet, SparseVec, UsageStats,
    VarType,
};
use std::collections::BTreeMap;

/// A live, set-up problem evaluator presenting the reduced free-variable
/// view. Instances are constructed by the registry only, at most once per
/// cache key per process, and must not be used after release.
///
/// Evaluation calls are not thread-safe: the native layer keeps global
/// state, so access to an instance must be serialized by the caller.
pub struct ProblemInstance {
    key: CacheKey,
    binding: EvaluatorBinding,
    info: ProblemInfo,
    projection: IndexProjection,
    baseline: UsageStats,
    // projected copies of the description vectors
    x0: Array1<f64>,
    bl: Array1<f64>,
    bu: Array1<f64>,
    vartype: Vec<VarType>,
}

impl ProblemInstance {
    pub(crate) fn new(
        key: CacheKey,
        binding: EvaluatorBinding,
        info: ProblemInfo,
        projection: IndexProjection,
        baseline: UsageStats,
    ) -> Result<Self> {
        let base = info.base();
        let x0 = projection.shrink(&base.x0)?;
        let bl = projection.shrink(&base.bl)?;
        let bu = projection.shrink(&base.bu)?;
        let vartype = projection
            .idx_free()
            .iter()
            .map(|&i| base.vartype[i])
            .collect();
        Ok(Self {
            key,
            binding,
            info,
            projection,
            baseline,
            x0,
            bl,
            bu,
            vartype,
        })
    }

    pub(crate) fn terminate(&self) -> Result<()> {
        self.binding.terminate()
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.info.base().name
    }

    /// Dimension of the caller-visible (free) variable space.
    pub fn n(&self) -> usize {
        self.projection.n_free()
    }

    pub fn n_full(&self) -> usize {
        self.projection.n_full()
    }

    pub fn n_free(&self) -> usize {
        self.projection.n_free()
    }

    pub fn n_fixed(&self) -> usize {
        self.projection.n_fixed()
    }

    pub fn m(&self) -> usize {
        self.info.m()
    }

    pub fn is_constrained(&self) -> bool {
        self.info.is_constrained()
    }

    pub fn x0(&self) -> Array1<f64> {
        self.x0.clone()
    }

    pub fn bl(&self) -> Array1<f64> {
        self.bl.clone()
    }

    pub fn bu(&self) -> Array1<f64> {
        self.bu.clone()
    }

    pub fn vartype(&self) -> &[VarType] {
        &self.vartype
    }

    /// Full-dimension problem description, before projection.
    pub fn info(&self) -> &ProblemInfo {
        &self.info
    }

    pub fn constraint_info(&self) -> Option<&ConstraintData> {
        self.info.constraints()
    }

    pub fn sif_params(&self) -> Option<&BTreeMap<String, f64>> {
        self.info.base().sif_params.as_ref()
    }

    pub fn projection(&self) -> &IndexProjection {
        &self.projection
    }

    /// Objective and constraint values; the constraint part is None for
    /// unconstrained problems.
    pub fn objcons(&self, x: &Array1<f64>) -> Result<(f64, Option<Array1<f64>>)> {
        let xf = self.expand_point(x)?;
        let (f, c) = self.binding.objcons(&xf)?;
        Ok((f, self.some_if_constrained(c)))
    }

    pub fn obj(&self, x: &Array1<f64>) -> Result<f64> {
        let xf = self.expand_point(x)?;
        self.binding.obj(&xf)
    }

    pub fn obj_grad(&self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        let xf = self.expand_point(x)?;
        let (f, g) = self.binding.obj_grad(&xf)?;
        Ok((f, self.projection.shrink(&g)?))
    }

    pub fn cons(&self, x: &Array1<f64>) -> Result<Option<Array1<f64>>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let xf = self.expand_point(x)?;
        Ok(Some(self.binding.cons(&xf)?))
    }

    /// Constraints plus dense Jacobian over the free columns.
    pub fn cons_grad(&self, x: &Array1<f64>) -> Result<Option<(Array1<f64>, Array2<f64>)>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let xf = self.expand_point(x)?;
        let (c, jac) = self.binding.cons_jac(&xf)?;
        Ok(Some((c, self.projection.shrink_matrix_cols(&jac)?)))
    }

    pub fn icons(&self, x: &Array1<f64>, index: usize) -> Result<Option<f64>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let xf = self.expand_point(x)?;
        Ok(Some(self.binding.cons_single(&xf, index)?))
    }

    pub fn icons_grad(&self, x: &Array1<f64>, index: usize) -> Result<Option<(f64, Array1<f64>)>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let xf = self.expand_point(x)?;
        let (ci, gi) = self.binding.cons_single_grad(&xf, index)?;
        Ok(Some((ci, self.projection.shrink(&gi)?)))
    }

    /// Gradient of the objective (v = None) or the Lagrangian, plus the
    /// constraint Jacobian; the Jacobian is None for unconstrained problems.
    pub fn lagjac(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
    ) -> Result<(Array1<f64>, Option<Array2<f64>>)> {
        let xf = self.expand_point(x)?;
        if !self.is_constrained() {
            self.reject_v(v)?;
            let (_, g) = self.binding.obj_grad(&xf)?;
            return Ok((self.projection.shrink(&g)?, None));
        }
        if let Some(v) = v {
            self.check_v(v)?;
        }
        let (g, jac) = self.binding.lagjac(&xf, v)?;
        Ok((
            self.projection.shrink(&g)?,
            Some(self.projection.shrink_matrix_cols(&jac)?),
        ))
    }

    /// Product of the constraint Jacobian with p: `J p` (p in the free
    /// space), or `J^T p` (p of length m) when `transpose`. None for
    /// unconstrained problems. A `None` x reuses the last Jacobian.
    pub fn jprod(
        &self,
        transpose: bool,
        p: &Array1<f64>,
        x: Option<&Array1<f64>>,
    ) -> Result<Option<Array1<f64>>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let pf = if transpose {
            self.check_v(p)?;
            p.clone()
        } else {
            self.expand_direction(p)?
        };
        let xf = match x {
            Some(x) => Some(self.expand_point(x)?),
            None => None,
        };
        let r = self.binding.jprod(transpose, &pf, xf.as_ref())?;
        if transpose {
            Ok(Some(self.projection.shrink(&r)?))
        } else {
            Ok(Some(r))
        }
    }

    /// Hessian of the objective (unconstrained, v = None) or of the
    /// Lagrangian (constrained, v required), over free rows and columns.
    pub fn hess(&self, x: &Array1<f64>, v: Option<&Array1<f64>>) -> Result<Array2<f64>> {
        let xf = self.expand_point(x)?;
        if let Some(v) = v {
            self.check_v(v)?;
        }
        let h = self.binding.hess(&xf, v)?;
        self.projection.shrink_matrix_rows_and_cols(&h)
    }

    /// Hessian of the objective, or of one constraint when `index` is set.
    pub fn ihess(&self, x: &Array1<f64>, index: Option<usize>) -> Result<Array2<f64>> {
        let xf = self.expand_point(x)?;
        let h = self.binding.ihess(&xf, index)?;
        self.projection.shrink_matrix_rows_and_cols(&h)
    }

    /// Hessian-vector product in the free space. A `None` x reuses the last
    /// Hessian; constrained problems require v alongside x.
    pub fn hprod(
        &self,
        p: &Array1<f64>,
        x: Option<&Array1<f64>>,
        v: Option<&Array1<f64>>,
    ) -> Result<Array1<f64>> {
        let pf = self.expand_direction(p)?;
        let xf = match x {
            Some(x) => Some(self.expand_point(x)?),
            None => None,
        };
        if let Some(v) = v {
            self.check_v(v)?;
        }
        let r = self.binding.hprod(&pf, xf.as_ref(), v)?;
        self.projection.shrink(&r)
    }

    /// Gradient, Jacobian and Hessian in one evaluation. The Jacobian is
    /// None for unconstrained problems.
    pub fn gradhess(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
        gradient_of_lagrangian: bool,
    ) -> Result<(Array1<f64>, Option<Array2<f64>>, Array2<f64>)> {
        let xf = self.expand_point(x)?;
        if let Some(v) = v {
            self.check_v(v)?;
        }
        let (g, jac, h) = self.binding.gradhess(&xf, v, gradient_of_lagrangian)?;
        let jac = if self.is_constrained() {
            Some(self.projection.shrink_matrix_cols(&jac)?)
        } else {
            None
        };
        Ok((
            self.projection.shrink(&g)?,
            jac,
            self.projection.shrink_matrix_rows_and_cols(&h)?,
        ))
    }

    /// Constraints plus sparse Jacobian over the free columns. None for
    /// unconstrained problems.
    pub fn scons(&self, x: &Array1<f64>) -> Result<Option<(Array1<f64>, SparseTriplet)>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let xf = self.expand_point(x)?;
        let (c, jac) = self.binding.scons(&xf)?;
        Ok(Some((c, self.projection.shrink_triplet_cols(&jac)?)))
    }

    /// One constraint plus its sparse gradient over the free entries.
    pub fn scons_single(&self, x: &Array1<f64>, index: usize) -> Result<Option<(f64, SparseVec)>> {
        if !self.is_constrained() {
            return Ok(None);
        }
        let xf = self.expand_point(x)?;
        let (ci, gi) = self.binding.scons_single(&xf, index)?;
        Ok(Some((ci, self.projection.shrink_sparse_vec(&gi)?)))
    }

    /// Sparse gradient of the objective or Lagrangian plus sparse Jacobian;
    /// the Jacobian is None for unconstrained problems.
    pub fn slagjac(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
    ) -> Result<(SparseVec, Option<SparseTriplet>)> {
        let xf = self.expand_point(x)?;
        if !self.is_constrained() {
            self.reject_v(v)?;
        } else if let Some(v) = v {
            self.check_v(v)?;
        }
        let (g, jac) = self.binding.slagjac(&xf, v)?;
        let jac = if self.is_constrained() {
            Some(self.projection.shrink_triplet_cols(&jac)?)
        } else {
            None
        };
        Ok((self.projection.shrink_sparse_vec(&g)?, jac))
    }

    /// Sparse Hessian of the objective or Lagrangian over free rows and
    /// columns.
    pub fn sphess(&self, x: &Array1<f64>, v: Option<&Array1<f64>>) -> Result<SparseTriplet> {
        let xf = self.expand_point(x)?;
        if let Some(v) = v {
            self.check_v(v)?;
        }
        let h = self.binding.sphess(&xf, v)?;
        self.projection.shrink_triplet_rows_and_cols(&h)
    }

    /// Sparse Hessian of the objective, or of one constraint.
    pub fn isphess(&self, x: &Array1<f64>, index: Option<usize>) -> Result<SparseTriplet> {
        let xf = self.expand_point(x)?;
        let h = self.binding.isphess(&xf, index)?;
        self.projection.shrink_triplet_rows_and_cols(&h)
    }

    /// Sparse gradient, Jacobian and Hessian in one evaluation.
    pub fn gradsphess(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
        gradient_of_lagrangian: bool,
    ) -> Result<(SparseVec, Option<SparseTriplet>, SparseTriplet)> {
        let xf = self.expand_point(x)?;
        if let Some(v) = v {
            self.check_v(v)?;
        }
        let (g, jac, h) = self.binding.gradsphess(&xf, v, gradient_of_lagrangian)?;
        let jac = if self.is_constrained() {
            Some(self.projection.shrink_triplet_cols(&jac)?)
        } else {
            None
        };
        Ok((
            self.projection.shrink_sparse_vec(&g)?,
            jac,
            self.projection.shrink_triplet_rows_and_cols(&h)?,
        ))
    }

    /// Usage counters accumulated since this instance was constructed.
    pub fn report(&self) -> Result<UsageStats> {
        Ok(self.binding.report()?.since(&self.baseline))
    }

    /// Variable names in the full space, fixed variables included.
    pub fn varnames(&self) -> Result<Vec<String>> {
        self.binding.varnames()
    }

    pub fn connames(&self) -> Result<Vec<String>> {
        self.binding.connames()
    }

    fn check_x(&self, x: &Array1<f64>) -> Result<()> {
        if x.len() != self.n() {
            return Err(Error::Shape {
                what: "x",
                expected: self.n(),
                got: x.len(),
            });
        }
        Ok(())
    }

    fn check_v(&self, v: &Array1<f64>) -> Result<()> {
        if v.len() != self.m() {
            return Err(Error::Shape {
                what: "v",
                expected: self.m(),
                got: v.len(),
            });
        }
        Ok(())
    }

    fn reject_v(&self, v: Option<&Array1<f64>>) -> Result<()> {
        match v {
            Some(v) => Err(Error::Shape {
                what: "v",
                expected: 0,
                got: v.len(),
            }),
            None => Ok(()),
        }
    }

    /// Evaluation points get the fixed variables' bound values filled in.
    fn expand_point(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_x(x)?;
        self.projection.expand(x, true)
    }

    /// Direction vectors get zeros at fixed positions.
    fn expand_direction(&self, p: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_x(p)?;
        self.projection.expand(p, false)
    }

    fn some_if_constrained(&self, c: Array1<f64>) -> Option<Array1<f64>> {
        if self.is_constrained() {
            Some(c)
        } else {
            None
        }
    }
}
