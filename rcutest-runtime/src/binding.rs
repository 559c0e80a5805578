use libloading::{Library, Symbol};
use ndarray::{Array1, Array2};
use rcutest_structs::{
    ConstraintCounts, ConstraintData, Error, OrderingFlags, ProblemData, ProblemInfo, Result,
    SparseTriplet, SparseVec, UsageStats, VarType, DATA_FILE, MODULE_FILE,
};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::raw::c_char;
use std::panic;
use std::path::Path;
use std::ptr;
use std::sync::{Mutex, MutexGuard};

const NAME_LEN: usize = 10;

type DimsFn = unsafe extern "C" fn(*const c_char, *mut i32, *mut i32) -> i32;
type SetupFn = unsafe extern "C" fn(
    *const c_char,
    i32,
    i32,
    i32,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut i32,
    *mut f64,
    *mut f64,
    *mut f64,
    *mut i32,
    *mut i32,
    *mut i32,
    *mut i32,
    *mut c_char,
) -> i32;
type TerminateFn = unsafe extern "C" fn() -> i32;
type NamesFn = unsafe extern "C" fn(*mut c_char) -> i32;
type ObjconsFn = unsafe extern "C" fn(*const f64, *mut f64, *mut f64) -> i32;
type ObjFn = unsafe extern "C" fn(*const f64, i32, *mut f64, *mut f64) -> i32;
type ConsFn = unsafe extern "C" fn(*const f64, i32, *mut f64, *mut f64) -> i32;
type ConsSingleFn = unsafe extern "C" fn(*const f64, i32, i32, *mut f64, *mut f64) -> i32;
type LagjacFn = unsafe extern "C" fn(*const f64, *const f64, *mut f64, *mut f64) -> i32;
type JprodFn = unsafe extern "C" fn(i32, *const f64, *const f64, *mut f64) -> i32;
type HessFn = unsafe extern "C" fn(*const f64, *const f64, *mut f64) -> i32;
type IhessFn = unsafe extern "C" fn(*const f64, i32, *mut f64) -> i32;
type HprodFn = unsafe extern "C" fn(*const f64, *const f64, *const f64, *mut f64) -> i32;
type GradhessFn =
    unsafe extern "C" fn(*const f64, *const f64, i32, *mut f64, *mut f64, *mut f64) -> i32;
type SconsFn =
    unsafe extern "C" fn(*const f64, *mut f64, *mut i32, *mut i32, *mut i32, *mut f64) -> i32;
type SconsSingleFn =
    unsafe extern "C" fn(*const f64, i32, *mut f64, *mut i32, *mut i32, *mut f64) -> i32;
type SlagjacFn = unsafe extern "C" fn(
    *const f64,
    *const f64,
    *mut i32,
    *mut i32,
    *mut f64,
    *mut i32,
    *mut i32,
    *mut i32,
    *mut f64,
) -> i32;
type SphessFn =
    unsafe extern "C" fn(*const f64, *const f64, *mut i32, *mut i32, *mut i32, *mut f64) -> i32;
type IsphessFn =
    unsafe extern "C" fn(*const f64, i32, *mut i32, *mut i32, *mut i32, *mut f64) -> i32;
type GradsphessFn = unsafe extern "C" fn(
    *const f64,
    *const f64,
    i32,
    *mut i32,
    *mut i32,
    *mut f64,
    *mut i32,
    *mut i32,
    *mut i32,
    *mut f64,
    *mut i32,
    *mut i32,
    *mut i32,
    *mut f64,
) -> i32;
type ReportFn = unsafe extern "C" fn(*mut f64, *mut f64) -> i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Loaded,
    Ready { nnzh: usize, nnzj: usize },
    Terminated,
}

/// One loaded evaluator module. The module holds process-global state: it
/// can be set up at most once, every evaluation routine requires setup
/// first, and nothing works after terminate. Calls are synchronous and not
/// thread-safe; callers serialize access.
pub struct EvaluatorBinding {
    library: Library,
    datafile: CString,
    n_full: usize,
    m: usize,
    state: Mutex<Lifecycle>,
}

impl EvaluatorBinding {
    /// Load the installed module from a cache entry directory and read the
    /// problem dimensions.
    pub fn load(dir: &Path) -> Result<Self> {
        let module_path = dir.join(MODULE_FILE);
        let library = panic::catch_unwind(|| unsafe { Library::new(&module_path) })
            .map_err(|_| Error::Load(format!("panic while loading {}", module_path.display())))?
            .map_err(|e| Error::Load(e.to_string()))?;

        let datafile = CString::new(dir.join(DATA_FILE).to_string_lossy().as_bytes())
            .map_err(|e| Error::Load(format!("bad data file path: {}", e)))?;

        let mut n: i32 = 0;
        let mut m: i32 = 0;
        let dims: Symbol<DimsFn> = unsafe { library.get(b"itf_dims") }
            .map_err(|e| Error::Load(e.to_string()))?;
        let status = unsafe { dims(datafile.as_ptr(), &mut n, &mut m) };
        check_status("itf_dims", status)?;
        drop(dims);

        Ok(Self {
            library,
            datafile,
            n_full: n as usize,
            m: m as usize,
            state: Mutex::new(Lifecycle::Loaded),
        })
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.n_full, self.m)
    }

    /// Set up the evaluator's global state and collect the problem
    /// description. Allowed exactly once per loaded module.
    pub fn setup(
        &self,
        ordering: OrderingFlags,
        sif_params: Option<BTreeMap<String, f64>>,
        sif_options: Vec<String>,
    ) -> Result<ProblemInfo> {
        let mut state = self.state()?;
        match *state {
            Lifecycle::Loaded => {}
            Lifecycle::Ready { .. } => {
                return Err(Error::State(
                    "setup already called for this evaluator".to_string(),
                ))
            }
            Lifecycle::Terminated => {
                return Err(Error::State("evaluator has been terminated".to_string()))
            }
        }

        let n = self.n_full;
        let m = self.m;
        let mut x0 = vec![0.0; n];
        let mut bl = vec![0.0; n];
        let mut bu = vec![0.0; n];
        let mut vartype_tags = vec![0i32; n];
        let mut v0 = vec![0.0; m];
        let mut cl = vec![0.0; m];
        let mut cu = vec![0.0; m];
        let mut equatn = vec![0i32; m];
        let mut linear = vec![0i32; m];
        let mut nnzh: i32 = 0;
        let mut nnzj: i32 = 0;
        let mut name_buf = vec![0u8; NAME_LEN + 1];

        let setup: Symbol<SetupFn> = self.sym(b"itf_setup")?;
        let status = unsafe {
            setup(
                self.datafile.as_ptr(),
                ordering.efirst as i32,
                ordering.lfirst as i32,
                ordering.nvfirst as i32,
                x0.as_mut_ptr(),
                bl.as_mut_ptr(),
                bu.as_mut_ptr(),
                vartype_tags.as_mut_ptr(),
                v0.as_mut_ptr(),
                cl.as_mut_ptr(),
                cu.as_mut_ptr(),
                equatn.as_mut_ptr(),
                linear.as_mut_ptr(),
                &mut nnzh,
                &mut nnzj,
                name_buf.as_mut_ptr() as *mut c_char,
            )
        };
        check_status("itf_setup", status)?;

        let vartype = vartype_tags
            .iter()
            .map(|&tag| VarType::from_tag(tag))
            .collect::<Result<Vec<VarType>>>()?;
        let name = trim_fortran_name(&name_buf);

        let base = ProblemData {
            name,
            n_full: n,
            x0: Array1::from(x0),
            bl: Array1::from(bl),
            bu: Array1::from(bu),
            vartype,
            nnzh: nnzh as usize,
            nvfirst: ordering.nvfirst,
            sif_params,
            sif_options,
        };
        let info = if m > 0 {
            ProblemInfo::Constrained {
                base,
                cons: ConstraintData {
                    m,
                    v0: Array1::from(v0),
                    cl: Array1::from(cl),
                    cu: Array1::from(cu),
                    equatn: equatn.iter().map(|&e| e != 0).collect(),
                    linear: linear.iter().map(|&l| l != 0).collect(),
                    nnzj: nnzj as usize,
                    efirst: ordering.efirst,
                    lfirst: ordering.lfirst,
                },
            }
        } else {
            ProblemInfo::Unconstrained { base }
        };

        *state = Lifecycle::Ready {
            nnzh: nnzh as usize,
            nnzj: nnzj as usize,
        };
        Ok(info)
    }

    /// Tear down the evaluator's global state. The binding is unusable
    /// afterwards.
    pub fn terminate(&self) -> Result<()> {
        let mut state = self.state()?;
        match *state {
            Lifecycle::Ready { .. } => {
                let terminate: Symbol<TerminateFn> = self.sym(b"itf_terminate")?;
                let status = unsafe { terminate() };
                *state = Lifecycle::Terminated;
                check_status("itf_terminate", status)
            }
            Lifecycle::Loaded => {
                *state = Lifecycle::Terminated;
                Ok(())
            }
            Lifecycle::Terminated => {
                Err(Error::State("evaluator already terminated".to_string()))
            }
        }
    }

    pub fn objcons(&self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let mut f = 0.0;
        let mut c = vec![0.0; self.m];
        let objcons: Symbol<ObjconsFn> = self.sym(b"itf_objcons")?;
        let status = unsafe { objcons(x.as_ptr(), &mut f, c.as_mut_ptr()) };
        check_status("itf_objcons", status)?;
        Ok((f, Array1::from(c)))
    }

    pub fn obj(&self, x: &Array1<f64>) -> Result<f64> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let mut f = 0.0;
        let obj: Symbol<ObjFn> = self.sym(b"itf_obj")?;
        let status = unsafe { obj(x.as_ptr(), 0, &mut f, ptr::null_mut()) };
        check_status("itf_obj", status)?;
        Ok(f)
    }

    pub fn obj_grad(&self, x: &Array1<f64>) -> Result<(f64, Array1<f64>)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let mut f = 0.0;
        let mut g = vec![0.0; self.n_full];
        let obj: Symbol<ObjFn> = self.sym(b"itf_obj")?;
        let status = unsafe { obj(x.as_ptr(), 1, &mut f, g.as_mut_ptr()) };
        check_status("itf_obj", status)?;
        Ok((f, Array1::from(g)))
    }

    pub fn cons(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let mut c = vec![0.0; self.m];
        let cons: Symbol<ConsFn> = self.sym(b"itf_cons")?;
        let status = unsafe { cons(x.as_ptr(), 0, c.as_mut_ptr(), ptr::null_mut()) };
        check_status("itf_cons", status)?;
        Ok(Array1::from(c))
    }

    pub fn cons_jac(&self, x: &Array1<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let mut c = vec![0.0; self.m];
        let mut jac = vec![0.0; self.m * self.n_full];
        let cons: Symbol<ConsFn> = self.sym(b"itf_cons")?;
        let status = unsafe { cons(x.as_ptr(), 1, c.as_mut_ptr(), jac.as_mut_ptr()) };
        check_status("itf_cons", status)?;
        let jac = Array2::from_shape_vec((self.m, self.n_full), jac)
            .map_err(|_| Error::State("jacobian shape mismatch".to_string()))?;
        Ok((Array1::from(c), jac))
    }

    pub fn cons_single(&self, x: &Array1<f64>, index: usize) -> Result<f64> {
        self.ensure_ready()?;
        self.check_x(x)?;
        self.check_cons_index(index)?;
        let mut ci = 0.0;
        let cons: Symbol<ConsSingleFn> = self.sym(b"itf_cons_single")?;
        let status = unsafe {
            cons(x.as_ptr(), (index + 1) as i32, 0, &mut ci, ptr::null_mut())
        };
        check_status("itf_cons_single", status)?;
        Ok(ci)
    }

    pub fn cons_single_grad(&self, x: &Array1<f64>, index: usize) -> Result<(f64, Array1<f64>)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        self.check_cons_index(index)?;
        let mut ci = 0.0;
        let mut gi = vec![0.0; self.n_full];
        let cons: Symbol<ConsSingleFn> = self.sym(b"itf_cons_single")?;
        let status = unsafe {
            cons(x.as_ptr(), (index + 1) as i32, 1, &mut ci, gi.as_mut_ptr())
        };
        check_status("itf_cons_single", status)?;
        Ok((ci, Array1::from(gi)))
    }

    pub fn lagjac(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let v_ptr = self.check_opt_v(v)?;
        let mut g = vec![0.0; self.n_full];
        let mut jac = vec![0.0; self.m * self.n_full];
        let lagjac: Symbol<LagjacFn> = self.sym(b"itf_lagjac")?;
        let status = unsafe { lagjac(x.as_ptr(), v_ptr, g.as_mut_ptr(), jac.as_mut_ptr()) };
        check_status("itf_lagjac", status)?;
        let jac = Array2::from_shape_vec((self.m, self.n_full), jac)
            .map_err(|_| Error::State("jacobian shape mismatch".to_string()))?;
        Ok((Array1::from(g), jac))
    }

    /// Product with the constraint Jacobian: `J p`, or `J^T p` when
    /// `transpose`. A `None` x reuses the last evaluated Jacobian.
    pub fn jprod(
        &self,
        transpose: bool,
        p: &Array1<f64>,
        x: Option<&Array1<f64>>,
    ) -> Result<Array1<f64>> {
        self.ensure_ready()?;
        let expected_p = if transpose { self.m } else { self.n_full };
        if p.len() != expected_p {
            return Err(Error::Shape {
                what: "p",
                expected: expected_p,
                got: p.len(),
            });
        }
        let x_ptr = match x {
            Some(x) => {
                self.check_x(x)?;
                x.as_ptr()
            }
            None => ptr::null(),
        };
        let result_len = if transpose { self.n_full } else { self.m };
        let mut r = vec![0.0; result_len];
        let jprod: Symbol<JprodFn> = self.sym(b"itf_jprod")?;
        let status = unsafe { jprod(transpose as i32, x_ptr, p.as_ptr(), r.as_mut_ptr()) };
        check_status("itf_jprod", status)?;
        Ok(Array1::from(r))
    }

    pub fn hess(&self, x: &Array1<f64>, v: Option<&Array1<f64>>) -> Result<Array2<f64>> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let v_ptr = self.check_required_v(v)?;
        let mut h = vec![0.0; self.n_full * self.n_full];
        let hess: Symbol<HessFn> = self.sym(b"itf_hess")?;
        let status = unsafe { hess(x.as_ptr(), v_ptr, h.as_mut_ptr()) };
        check_status("itf_hess", status)?;
        Array2::from_shape_vec((self.n_full, self.n_full), h)
            .map_err(|_| Error::State("hessian shape mismatch".to_string()))
    }

    /// Hessian of the objective, or of one constraint when `index` is set.
    pub fn ihess(&self, x: &Array1<f64>, index: Option<usize>) -> Result<Array2<f64>> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let native_index = match index {
            Some(i) => {
                self.check_cons_index(i)?;
                (i + 1) as i32
            }
            None => 0,
        };
        let mut h = vec![0.0; self.n_full * self.n_full];
        let ihess: Symbol<IhessFn> = self.sym(b"itf_ihess")?;
        let status = unsafe { ihess(x.as_ptr(), native_index, h.as_mut_ptr()) };
        check_status("itf_ihess", status)?;
        Array2::from_shape_vec((self.n_full, self.n_full), h)
            .map_err(|_| Error::State("hessian shape mismatch".to_string()))
    }

    /// Product with the Hessian of the objective (unconstrained) or the
    /// Lagrangian (constrained). A `None` x reuses the last Hessian.
    pub fn hprod(
        &self,
        p: &Array1<f64>,
        x: Option<&Array1<f64>>,
        v: Option<&Array1<f64>>,
    ) -> Result<Array1<f64>> {
        self.ensure_ready()?;
        if p.len() != self.n_full {
            return Err(Error::Shape {
                what: "p",
                expected: self.n_full,
                got: p.len(),
            });
        }
        let x_ptr = match x {
            Some(x) => {
                self.check_x(x)?;
                x.as_ptr()
            }
            None => ptr::null(),
        };
        let v_ptr = match (x, self.m) {
            // the native layer only reads v when recomputing at a new point
            (Some(_), m) if m > 0 => self.check_required_v(v)?,
            _ => self.check_opt_v(v)?,
        };
        let mut r = vec![0.0; self.n_full];
        let hprod: Symbol<HprodFn> = self.sym(b"itf_hprod")?;
        let status = unsafe { hprod(x_ptr, v_ptr, p.as_ptr(), r.as_mut_ptr()) };
        check_status("itf_hprod", status)?;
        Ok(Array1::from(r))
    }

    pub fn gradhess(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
        grad_lagrangian: bool,
    ) -> Result<(Array1<f64>, Array2<f64>, Array2<f64>)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        let v_ptr = self.check_required_v(v)?;
        let mut g = vec![0.0; self.n_full];
        let mut jac = vec![0.0; self.m * self.n_full];
        let mut h = vec![0.0; self.n_full * self.n_full];
        let gradhess: Symbol<GradhessFn> = self.sym(b"itf_gradhess")?;
        let status = unsafe {
            gradhess(
                x.as_ptr(),
                v_ptr,
                grad_lagrangian as i32,
                g.as_mut_ptr(),
                jac.as_mut_ptr(),
                h.as_mut_ptr(),
            )
        };
        check_status("itf_gradhess", status)?;
        let jac = Array2::from_shape_vec((self.m, self.n_full), jac)
            .map_err(|_| Error::State("jacobian shape mismatch".to_string()))?;
        let h = Array2::from_shape_vec((self.n_full, self.n_full), h)
            .map_err(|_| Error::State("hessian shape mismatch".to_string()))?;
        Ok((Array1::from(g), jac, h))
    }

    /// Constraints plus sparse Jacobian, 0-based.
    pub fn scons(&self, x: &Array1<f64>) -> Result<(Array1<f64>, SparseTriplet)> {
        let (_, nnzj) = self.ensure_ready()?;
        self.check_x(x)?;
        let mut c = vec![0.0; self.m];
        let mut nnz: i32 = 0;
        let mut rows = vec![0i32; nnzj];
        let mut cols = vec![0i32; nnzj];
        let mut vals = vec![0.0; nnzj];
        let scons: Symbol<SconsFn> = self.sym(b"itf_scons")?;
        let status = unsafe {
            scons(
                x.as_ptr(),
                c.as_mut_ptr(),
                &mut nnz,
                rows.as_mut_ptr(),
                cols.as_mut_ptr(),
                vals.as_mut_ptr(),
            )
        };
        check_status("itf_scons", status)?;
        let triplet = triplet_from_native(
            (self.m, self.n_full),
            &rows[..nnz as usize],
            &cols[..nnz as usize],
            &vals[..nnz as usize],
        );
        Ok((Array1::from(c), triplet))
    }

    /// One constraint plus its sparse gradient, 0-based.
    pub fn scons_single(&self, x: &Array1<f64>, index: usize) -> Result<(f64, SparseVec)> {
        self.ensure_ready()?;
        self.check_x(x)?;
        self.check_cons_index(index)?;
        let mut ci = 0.0;
        let mut nnz: i32 = 0;
        let mut idx = vec![0i32; self.n_full];
        let mut vals = vec![0.0; self.n_full];
        let scons: Symbol<SconsSingleFn> = self.sym(b"itf_scons_single")?;
        let status = unsafe {
            scons(
                x.as_ptr(),
                (index + 1) as i32,
                &mut ci,
                &mut nnz,
                idx.as_mut_ptr(),
                vals.as_mut_ptr(),
            )
        };
        check_status("itf_scons_single", status)?;
        Ok((ci, sparse_vec_from_native(self.n_full, &idx[..nnz as usize], &vals[..nnz as usize])))
    }

    /// Sparse objective/Lagrangian gradient plus sparse Jacobian, 0-based.
    pub fn slagjac(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
    ) -> Result<(SparseVec, SparseTriplet)> {
        let (_, nnzj) = self.ensure_ready()?;
        self.check_x(x)?;
        let v_ptr = self.check_opt_v(v)?;
        let g_cap = self.n_full;
        let j_cap = nnzj.max(1);
        let mut g_nnz: i32 = 0;
        let mut g_idx = vec![0i32; g_cap.max(1)];
        let mut g_val = vec![0.0; g_cap.max(1)];
        let mut j_nnz: i32 = 0;
        let mut j_rows = vec![0i32; j_cap];
        let mut j_cols = vec![0i32; j_cap];
        let mut j_val = vec![0.0; j_cap];
        let slagjac: Symbol<SlagjacFn> = self.sym(b"itf_slagjac")?;
        let status = unsafe {
            slagjac(
                x.as_ptr(),
                v_ptr,
                &mut g_nnz,
                g_idx.as_mut_ptr(),
                g_val.as_mut_ptr(),
                &mut j_nnz,
                j_rows.as_mut_ptr(),
                j_cols.as_mut_ptr(),
                j_val.as_mut_ptr(),
            )
        };
        check_status("itf_slagjac", status)?;
        let g = sparse_vec_from_native(self.n_full, &g_idx[..g_nnz as usize], &g_val[..g_nnz as usize]);
        let jac = triplet_from_native(
            (self.m, self.n_full),
            &j_rows[..j_nnz as usize],
            &j_cols[..j_nnz as usize],
            &j_val[..j_nnz as usize],
        );
        Ok((g, jac))
    }

    /// Sparse Hessian of the objective (unconstrained) or Lagrangian
    /// (constrained), mirrored to the full symmetric triplet set, 0-based.
    pub fn sphess(&self, x: &Array1<f64>, v: Option<&Array1<f64>>) -> Result<SparseTriplet> {
        let (nnzh, _) = self.ensure_ready()?;
        self.check_x(x)?;
        let v_ptr = self.check_required_v(v)?;
        let mut nnz: i32 = 0;
        let cap = nnzh.max(1);
        let mut rows = vec![0i32; cap];
        let mut cols = vec![0i32; cap];
        let mut vals = vec![0.0; cap];
        let sphess: Symbol<SphessFn> = self.sym(b"itf_sphess")?;
        let status = unsafe {
            sphess(
                x.as_ptr(),
                v_ptr,
                &mut nnz,
                rows.as_mut_ptr(),
                cols.as_mut_ptr(),
                vals.as_mut_ptr(),
            )
        };
        check_status("itf_sphess", status)?;
        Ok(upper_triplet_from_native(
            self.n_full,
            &rows[..nnz as usize],
            &cols[..nnz as usize],
            &vals[..nnz as usize],
        ))
    }

    /// Sparse Hessian of the objective, or of one constraint, mirrored to
    /// the full symmetric triplet set, 0-based.
    pub fn isphess(&self, x: &Array1<f64>, index: Option<usize>) -> Result<SparseTriplet> {
        let (nnzh, _) = self.ensure_ready()?;
        self.check_x(x)?;
        let native_index = match index {
            Some(i) => {
                self.check_cons_index(i)?;
                (i + 1) as i32
            }
            None => 0,
        };
        let mut nnz: i32 = 0;
        let cap = nnzh.max(1);
        let mut rows = vec![0i32; cap];
        let mut cols = vec![0i32; cap];
        let mut vals = vec![0.0; cap];
        let isphess: Symbol<IsphessFn> = self.sym(b"itf_isphess")?;
        let status = unsafe {
            isphess(
                x.as_ptr(),
                native_index,
                &mut nnz,
                rows.as_mut_ptr(),
                cols.as_mut_ptr(),
                vals.as_mut_ptr(),
            )
        };
        check_status("itf_isphess", status)?;
        Ok(upper_triplet_from_native(
            self.n_full,
            &rows[..nnz as usize],
            &cols[..nnz as usize],
            &vals[..nnz as usize],
        ))
    }

    /// Sparse gradient, sparse Jacobian and sparse (mirrored) Hessian in
    /// one native call.
    pub fn gradsphess(
        &self,
        x: &Array1<f64>,
        v: Option<&Array1<f64>>,
        grad_lagrangian: bool,
    ) -> Result<(SparseVec, SparseTriplet, SparseTriplet)> {
        let (nnzh, nnzj) = self.ensure_ready()?;
        self.check_x(x)?;
        let v_ptr = self.check_required_v(v)?;
        let mut g_nnz: i32 = 0;
        let mut g_idx = vec![0i32; self.n_full.max(1)];
        let mut g_val = vec![0.0; self.n_full.max(1)];
        let j_cap = nnzj.max(1);
        let mut j_nnz: i32 = 0;
        let mut j_rows = vec![0i32; j_cap];
        let mut j_cols = vec![0i32; j_cap];
        let mut j_val = vec![0.0; j_cap];
        let h_cap = nnzh.max(1);
        let mut h_nnz: i32 = 0;
        let mut h_rows = vec![0i32; h_cap];
        let mut h_cols = vec![0i32; h_cap];
        let mut h_val = vec![0.0; h_cap];
        let gradsphess: Symbol<GradsphessFn> = self.sym(b"itf_gradsphess")?;
        let status = unsafe {
            gradsphess(
                x.as_ptr(),
                v_ptr,
                grad_lagrangian as i32,
                &mut g_nnz,
                g_idx.as_mut_ptr(),
                g_val.as_mut_ptr(),
                &mut j_nnz,
                j_rows.as_mut_ptr(),
                j_cols.as_mut_ptr(),
                j_val.as_mut_ptr(),
                &mut h_nnz,
                h_rows.as_mut_ptr(),
                h_cols.as_mut_ptr(),
                h_val.as_mut_ptr(),
            )
        };
        check_status("itf_gradsphess", status)?;
        let g = sparse_vec_from_native(self.n_full, &g_idx[..g_nnz as usize], &g_val[..g_nnz as usize]);
        let jac = triplet_from_native(
            (self.m, self.n_full),
            &j_rows[..j_nnz as usize],
            &j_cols[..j_nnz as usize],
            &j_val[..j_nnz as usize],
        );
        let h = upper_triplet_from_native(
            self.n_full,
            &h_rows[..h_nnz as usize],
            &h_cols[..h_nnz as usize],
            &h_val[..h_nnz as usize],
        );
        Ok((g, jac, h))
    }

    /// Cumulative usage counters from the native layer.
    pub fn report(&self) -> Result<UsageStats> {
        self.ensure_ready()?;
        let mut calls = [0.0f64; 7];
        let mut time = [0.0f64; 2];
        let report: Symbol<ReportFn> = self.sym(b"itf_report")?;
        let status = unsafe { report(calls.as_mut_ptr(), time.as_mut_ptr()) };
        check_status("itf_report", status)?;
        Ok(UsageStats {
            f: calls[0] as u64,
            g: calls[1] as u64,
            h: calls[2] as u64,
            hprod: calls[3] as u64,
            cons: (self.m > 0).then(|| ConstraintCounts {
                c: calls[4] as u64,
                cg: calls[5] as u64,
                ch: calls[6] as u64,
            }),
            tsetup: time[0],
            trun: time[1],
        })
    }

    pub fn varnames(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        let mut buf = vec![0u8; self.n_full * NAME_LEN];
        let varnames: Symbol<NamesFn> = self.sym(b"itf_varnames")?;
        let status = unsafe { varnames(buf.as_mut_ptr() as *mut c_char) };
        check_status("itf_varnames", status)?;
        Ok(fixed_width_names(&buf))
    }

    pub fn connames(&self) -> Result<Vec<String>> {
        self.ensure_ready()?;
        let mut buf = vec![0u8; self.m * NAME_LEN];
        let connames: Symbol<NamesFn> = self.sym(b"itf_connames")?;
        let status = unsafe { connames(buf.as_mut_ptr() as *mut c_char) };
        check_status("itf_connames", status)?;
        Ok(fixed_width_names(&buf))
    }

    fn sym<T>(&self, name: &[u8]) -> Result<Symbol<T>> {
        unsafe { self.library.get(name) }.map_err(|e| Error::Load(e.to_string()))
    }

    fn state(&self) -> Result<MutexGuard<Lifecycle>> {
        self.state
            .lock()
            .map_err(|_| Error::State("evaluator state lock poisoned".to_string()))
    }

    fn ensure_ready(&self) -> Result<(usize, usize)> {
        match *self.state()? {
            Lifecycle::Ready { nnzh, nnzj } => Ok((nnzh, nnzj)),
            Lifecycle::Loaded => Err(Error::State(
                "evaluation routine called before setup".to_string(),
            )),
            Lifecycle::Terminated => {
                Err(Error::State("evaluator has been terminated".to_string()))
            }
        }
    }

    fn check_x(&self, x: &Array1<f64>) -> Result<()> {
        if x.len() != self.n_full {
            return Err(Error::Shape {
                what: "x",
                expected: self.n_full,
                got: x.len(),
            });
        }
        Ok(())
    }

    fn check_cons_index(&self, index: usize) -> Result<()> {
        if self.m == 0 || index >= self.m {
            return Err(Error::Shape {
                what: "constraint index",
                expected: self.m,
                got: index,
            });
        }
        Ok(())
    }

    /// v is optional for Lagrangian-or-objective routines but must have
    /// length m when present, and is meaningless on unconstrained problems.
    fn check_opt_v(&self, v: Option<&Array1<f64>>) -> Result<*const f64> {
        match v {
            None => Ok(ptr::null()),
            Some(v) => {
                if self.m == 0 {
                    return Err(Error::Shape {
                        what: "v",
                        expected: 0,
                        got: v.len(),
                    });
                }
                if v.len() != self.m {
                    return Err(Error::Shape {
                        what: "v",
                        expected: self.m,
                        got: v.len(),
                    });
                }
                Ok(v.as_ptr())
            }
        }
    }

    /// v is mandatory on constrained problems, forbidden on unconstrained.
    fn check_required_v(&self, v: Option<&Array1<f64>>) -> Result<*const f64> {
        if self.m > 0 && v.is_none() {
            return Err(Error::Shape {
                what: "v",
                expected: self.m,
                got: 0,
            });
        }
        self.check_opt_v(v)
    }
}

fn check_status(routine: &'static str, status: i32) -> Result<()> {
    if status == 0 {
        Ok(())
    } else if status == -2 {
        Err(Error::State(format!(
            "{} called outside the set-up lifecycle",
            routine
        )))
    } else if status == -3 {
        Err(Error::State(format!(
            "{} called on an unconstrained problem",
            routine
        )))
    } else {
        Err(Error::Native { routine, status })
    }
}

fn sparse_vec_from_native(len: usize, idx: &[i32], vals: &[f64]) -> SparseVec {
    SparseVec::new(
        len,
        idx.iter().map(|&i| (i - 1) as usize).collect(),
        vals.to_vec(),
    )
}

fn triplet_from_native(
    shape: (usize, usize),
    rows: &[i32],
    cols: &[i32],
    vals: &[f64],
) -> SparseTriplet {
    SparseTriplet::new(
        shape,
        rows.iter().map(|&r| (r - 1) as usize).collect(),
        cols.iter().map(|&c| (c - 1) as usize).collect(),
        vals.to_vec(),
    )
}

fn upper_triplet_from_native(n: usize, rows: &[i32], cols: &[i32], vals: &[f64]) -> SparseTriplet {
    SparseTriplet::from_upper_triangle(
        n,
        rows.iter().map(|&r| (r - 1) as usize).collect(),
        cols.iter().map(|&c| (c - 1) as usize).collect(),
        vals.to_vec(),
    )
}

fn trim_fortran_name(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

fn fixed_width_names(buf: &[u8]) -> Vec<String> {
    buf.chunks(NAME_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).trim_end().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_names() {
        let buf = b"X1        X2        LONGNAME  ";
        assert_eq!(fixed_width_names(buf), vec!["X1", "X2", "LONGNAME"]);
    }

    #[test]
    fn test_trim_fortran_name() {
        assert_eq!(trim_fortran_name(b"ROSENBR   \0"), "ROSENBR");
        assert_eq!(trim_fortran_name(b"\0\0\0"), "");
    }

    #[test]
    fn test_native_index_conversion() {
        let v = sparse_vec_from_native(4, &[1, 4], &[0.5, -1.0]);
        assert_eq!(v.indices, vec![0, 3]);

        let t = triplet_from_native((2, 3), &[1, 2], &[3, 1], &[1.0, 2.0]);
        assert_eq!(t.rows, vec![0, 1]);
        assert_eq!(t.cols, vec![2, 0]);

        let h = upper_triplet_from_native(2, &[1, 1], &[1, 2], &[4.0, 1.0]);
        assert_eq!(h.nnz(), 3);
    }
}
