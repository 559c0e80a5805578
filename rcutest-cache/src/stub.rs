/// C source of the interface stub that the build pipeline writes into each
/// cache entry and links into the evaluator module. It adapts the Fortran
/// evaluation library to the flat C ABI the runtime binding loads.
///
/// Conventions shared with the binding:
/// - every entry point returns an int status, 0 on success; negative values
///   are stub-level errors (-1 data file, -2 lifecycle, -3 no constraints),
///   positive values are native statuses
/// - sparse outputs are triplet arrays carrying the native 1-based indices;
///   Hessian triplets cover the diagonal and upper triangle only
/// - dense Jacobians are written row-major, m rows by n columns
/// - a NULL x/v argument selects the "reuse last point" / "objective
///   instead of Lagrangian" variant of a routine
pub const ITF_STUB_SOURCE: &str = r#"/* Interface stub for one compiled problem evaluator.
   Generated at build time; compiled and linked with the decoded
   Fortran sources against libcutest. */

#include <stdlib.h>
#include <string.h>
#include "cutest.h"

#define STR_LEN 10

_Static_assert(sizeof(integer) == 4, "stub requires a 32-bit integer CUTEst build");
_Static_assert(sizeof(logical) == 4, "stub requires 32-bit logicals");

static integer status = 0;
static integer nvar = 0;
static integer ncon = 0;
static integer nnzj_cap = 0;    /* nonzeros for csgr-style outputs */
static integer nnzh_cap = 0;    /* nonzeros in upper triangular Hessian */
static int setup_called = 0;
static int datafile_open = 0;

static integer funit = 42;      /* FORTRAN unit for the problem data file */
static integer iout = 6;
static integer io_buffer = 11;

static logical ltrue = TRUE_, lfalse = FALSE_;

static int open_datafile(const char *path) {
    integer io_err = 0;
    if (!datafile_open)
        FORTRAN_open(&funit, path, &io_err);
    if (io_err)
        return -1;
    datafile_open = 1;
    return 0;
}

static void close_datafile(void) {
    integer io_err = 0;
    if (datafile_open)
        FORTRAN_close(&funit, &io_err);
    datafile_open = 0;
}

int itf_dims(const char *path, integer *n, integer *m) {
    if (open_datafile(path))
        return -1;
    CUTEST_cdimen(&status, &funit, &nvar, &ncon);
    close_datafile();
    if (status)
        return status;
    *n = nvar;
    *m = ncon;
    return 0;
}

int itf_setup(const char *path, integer efirst, integer lfirst, integer nvfirst,
              doublereal *x, doublereal *bl, doublereal *bu, integer *vartype,
              doublereal *v, doublereal *cl, doublereal *cu,
              integer *equatn, integer *linear,
              integer *nnzh, integer *nnzj, char *name) {
    integer e_order, l_order, v_order, i;

    if (setup_called)
        return -2;
    if (open_datafile(path))
        return -1;
    CUTEST_cdimen(&status, &funit, &nvar, &ncon);
    if (status) {
        close_datafile();
        return status;
    }

    if (ncon > 0) {
        e_order = efirst ? 1 : 0;
        l_order = lfirst ? 1 : 0;
        v_order = nvfirst ? 1 : 0;
        CUTEST_csetup(&status, &funit, &iout, &io_buffer, &nvar, &ncon,
                      x, bl, bu, v, cl, cu,
                      (logical *)equatn, (logical *)linear,
                      &e_order, &l_order, &v_order);
    } else {
        CUTEST_usetup(&status, &funit, &iout, &io_buffer, &nvar, x, bl, bu);
    }
    if (status) {
        close_datafile();
        return status;
    }

    if (ncon > 0)
        CUTEST_cvartype(&status, &nvar, vartype);
    else
        CUTEST_uvartype(&status, &nvar, vartype);
    if (status) {
        close_datafile();
        return status;
    }

    if (ncon > 0) {
        CUTEST_cdimsh(&status, &nnzh_cap);
        if (!status)
            CUTEST_cdimsj(&status, &nnzj_cap);
    } else {
        CUTEST_udimsh(&status, &nnzh_cap);
        nnzj_cap = 0;
    }
    if (status) {
        close_datafile();
        return status;
    }
    *nnzh = nnzh_cap;
    *nnzj = nnzj_cap;

    for (i = 0; i < STR_LEN + 1; i++)
        name[i] = 0;
    CUTEST_probname(&status, name);
    close_datafile();
    if (status)
        return status;

    setup_called = 1;
    return 0;
}

int itf_terminate(void) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cterminate(&status);
    else
        CUTEST_uterminate(&status);
    setup_called = 0;
    return status;
}

/* buf receives nvar records of STR_LEN space-padded characters */
int itf_varnames(char *buf) {
    if (!setup_called)
        return -2;
    CUTEST_varnames(&status, &nvar, buf);
    return status;
}

int itf_connames(char *buf) {
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    CUTEST_connames(&status, &ncon, buf);
    return status;
}

int itf_objcons(const doublereal *x, doublereal *f, doublereal *c) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cfn(&status, &nvar, &ncon, (doublereal *)x, f, c);
    else
        CUTEST_ufn(&status, &nvar, (doublereal *)x, f);
    return status;
}

int itf_obj(const doublereal *x, integer want_grad, doublereal *f, doublereal *g) {
    logical *grad = want_grad ? &ltrue : &lfalse;
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cofg(&status, &nvar, (doublereal *)x, f, g, grad);
    else
        CUTEST_uofg(&status, &nvar, (doublereal *)x, f, g, grad);
    return status;
}

/* jac is written row-major ncon x nvar: the Fortran layer fills it as the
   column-major transposed Jacobian, which is the same memory */
int itf_cons(const doublereal *x, integer want_jac, doublereal *c, doublereal *jac) {
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    CUTEST_ccfg(&status, &nvar, &ncon, (doublereal *)x, c,
                &ltrue, &nvar, &ncon, jac,
                want_jac ? &ltrue : &lfalse);
    return status;
}

/* index is 1-based */
int itf_cons_single(const doublereal *x, integer index, integer want_grad,
                    doublereal *ci, doublereal *gi) {
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    CUTEST_ccifg(&status, &nvar, &index, (doublereal *)x, ci, gi,
                 want_grad ? &ltrue : &lfalse);
    return status;
}

/* v == NULL: gradient of the objective; otherwise of the Lagrangian */
int itf_lagjac(const doublereal *x, const doublereal *v, doublereal *g, doublereal *jac) {
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    CUTEST_cgr(&status, &nvar, &ncon, (doublereal *)x, (doublereal *)v,
               v ? &ltrue : &lfalse, g, &ltrue, &nvar, &ncon, jac);
    return status;
}

/* x == NULL: product with the last evaluated Jacobian */
int itf_jprod(integer transpose, const doublereal *x, const doublereal *p, doublereal *r) {
    integer lp, lr;
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    lp = transpose ? ncon : nvar;
    lr = transpose ? nvar : ncon;
    CUTEST_cjprod(&status, &nvar, &ncon, x ? &lfalse : &ltrue,
                  transpose ? &ltrue : &lfalse,
                  (doublereal *)x, (doublereal *)p, &lp, r, &lr);
    return status;
}

/* h is nvar x nvar, symmetric */
int itf_hess(const doublereal *x, const doublereal *v, doublereal *h) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cdh(&status, &nvar, &ncon, (doublereal *)x, (doublereal *)v, &nvar, h);
    else
        CUTEST_udh(&status, &nvar, (doublereal *)x, &nvar, h);
    return status;
}

/* index 0: objective Hessian; otherwise 1-based constraint Hessian */
int itf_ihess(const doublereal *x, integer index, doublereal *h) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cidh(&status, &nvar, (doublereal *)x, &index, &nvar, h);
    else
        CUTEST_udh(&status, &nvar, (doublereal *)x, &nvar, h);
    return status;
}

/* x == NULL: product with the last evaluated Hessian */
int itf_hprod(const doublereal *x, const doublereal *v, const doublereal *p, doublereal *r) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_chprod(&status, &nvar, &ncon, x ? &lfalse : &ltrue,
                      (doublereal *)x, (doublereal *)v, (doublereal *)p, r);
    else
        CUTEST_uhprod(&status, &nvar, x ? &lfalse : &ltrue,
                      (doublereal *)x, (doublereal *)p, r);
    return status;
}

int itf_gradhess(const doublereal *x, const doublereal *v, integer grad_lagrangian,
                 doublereal *g, doublereal *jac, doublereal *h) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cgrdh(&status, &nvar, &ncon, (doublereal *)x, (doublereal *)v,
                     grad_lagrangian ? &ltrue : &lfalse,
                     g, &ltrue, &nvar, &ncon, jac, &nvar, h);
    else
        CUTEST_ugrdh(&status, &nvar, (doublereal *)x, g, &nvar, h);
    return status;
}

/* rows receive 1-based constraint indices, cols 1-based variable indices;
   caller buffers sized for nnzj */
int itf_scons(const doublereal *x, doublereal *c,
              integer *nnz, integer *rows, integer *cols, doublereal *vals) {
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    CUTEST_ccfsg(&status, &nvar, &ncon, (doublereal *)x, c,
                 nnz, &nnzj_cap, vals, cols, rows, &ltrue);
    return status;
}

int itf_scons_single(const doublereal *x, integer index, doublereal *ci,
                     integer *nnz, integer *idx, doublereal *vals) {
    if (!setup_called)
        return -2;
    if (ncon == 0)
        return -3;
    CUTEST_ccifsg(&status, &nvar, &index, (doublereal *)x, ci,
                  nnz, &nvar, vals, idx, &ltrue);
    return status;
}

/* Gradient entries (function index 0) are split from constraint entries.
   g buffers sized for nvar, j buffers for nnzj. v == NULL selects the
   objective gradient. */
int itf_slagjac(const doublereal *x, const doublereal *v,
                integer *g_nnz, integer *g_idx, doublereal *g_val,
                integer *j_nnz, integer *j_rows, integer *j_cols, doublereal *j_val) {
    integer total = 0, i, jg = 0, jj = 0;
    integer *ivar, *ifun;
    doublereal *cval;

    if (!setup_called)
        return -2;

    if (ncon == 0) {
        doublereal *dense = (doublereal *)malloc(nvar * sizeof(doublereal));
        if (!dense)
            return -1;
        CUTEST_ugr(&status, &nvar, (doublereal *)x, dense);
        if (status) {
            free(dense);
            return status;
        }
        for (i = 0; i < nvar; i++) {
            g_idx[i] = i + 1;
            g_val[i] = dense[i];
        }
        *g_nnz = nvar;
        *j_nnz = 0;
        free(dense);
        return 0;
    }

    ivar = (integer *)malloc(nnzj_cap * sizeof(integer));
    ifun = (integer *)malloc(nnzj_cap * sizeof(integer));
    cval = (doublereal *)malloc(nnzj_cap * sizeof(doublereal));
    if (!ivar || !ifun || !cval) {
        free(ivar); free(ifun); free(cval);
        return -1;
    }
    CUTEST_csgr(&status, &nvar, &ncon, (doublereal *)x, (doublereal *)v,
                v ? &ltrue : &lfalse, &total, &nnzj_cap, cval, ivar, ifun);
    if (!status) {
        for (i = 0; i < total; i++) {
            if (ifun[i] == 0) {
                g_idx[jg] = ivar[i];
                g_val[jg] = cval[i];
                jg++;
            } else {
                j_rows[jj] = ifun[i];
                j_cols[jj] = ivar[i];
                j_val[jj] = cval[i];
                jj++;
            }
        }
        *g_nnz = jg;
        *j_nnz = jj;
    }
    free(ivar); free(ifun); free(cval);
    return status;
}

/* Diagonal plus upper triangle, 1-based; caller buffers sized for nnzh */
int itf_sphess(const doublereal *x, const doublereal *v,
               integer *nnz, integer *rows, integer *cols, doublereal *vals) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_csh(&status, &nvar, &ncon, (doublereal *)x, (doublereal *)v,
                   nnz, &nnzh_cap, vals, rows, cols);
    else
        CUTEST_ush(&status, &nvar, (doublereal *)x, nnz, &nnzh_cap, vals, rows, cols);
    return status;
}

int itf_isphess(const doublereal *x, integer index,
                integer *nnz, integer *rows, integer *cols, doublereal *vals) {
    if (!setup_called)
        return -2;
    if (ncon > 0)
        CUTEST_cish(&status, &nvar, (doublereal *)x, &index,
                    nnz, &nnzh_cap, vals, rows, cols);
    else
        CUTEST_ush(&status, &nvar, (doublereal *)x, nnz, &nnzh_cap, vals, rows, cols);
    return status;
}

int itf_gradsphess(const doublereal *x, const doublereal *v, integer grad_lagrangian,
                   integer *g_nnz, integer *g_idx, doublereal *g_val,
                   integer *j_nnz, integer *j_rows, integer *j_cols, doublereal *j_val,
                   integer *h_nnz, integer *h_rows, integer *h_cols, doublereal *h_val) {
    integer total = 0, i, jg = 0, jj = 0;
    integer *ivar, *ifun;
    doublereal *cval;

    if (!setup_called)
        return -2;

    if (ncon == 0) {
        doublereal *dense = (doublereal *)malloc(nvar * sizeof(doublereal));
        if (!dense)
            return -1;
        CUTEST_ugrsh(&status, &nvar, (doublereal *)x, dense,
                     h_nnz, &nnzh_cap, h_val, h_rows, h_cols);
        if (!status) {
            for (i = 0; i < nvar; i++) {
                g_idx[i] = i + 1;
                g_val[i] = dense[i];
            }
            *g_nnz = nvar;
            *j_nnz = 0;
        }
        free(dense);
        return status;
    }

    ivar = (integer *)malloc(nnzj_cap * sizeof(integer));
    ifun = (integer *)malloc(nnzj_cap * sizeof(integer));
    cval = (doublereal *)malloc(nnzj_cap * sizeof(doublereal));
    if (!ivar || !ifun || !cval) {
        free(ivar); free(ifun); free(cval);
        return -1;
    }
    CUTEST_csgrsh(&status, &nvar, &ncon, (doublereal *)x, (doublereal *)v,
                  grad_lagrangian ? &ltrue : &lfalse,
                  &total, &nnzj_cap, cval, ivar, ifun,
                  h_nnz, &nnzh_cap, h_val, h_rows, h_cols);
    if (!status) {
        for (i = 0; i < total; i++) {
            if (ifun[i] == 0) {
                g_idx[jg] = ivar[i];
                g_val[jg] = cval[i];
                jg++;
            } else {
                j_rows[jj] = ifun[i];
                j_cols[jj] = ivar[i];
                j_val[jj] = cval[i];
                jj++;
            }
        }
        *g_nnz = jg;
        *j_nnz = jj;
    }
    free(ivar); free(ifun); free(cval);
    return status;
}

/* calls[7]: f, g, H, Hprod, c, cg, cH; time[2]: setup, run.
   Unconstrained problems report the first four counters only. */
int itf_report(doublereal *calls, doublereal *time) {
    integer i;
    if (!setup_called)
        return -2;
    if (ncon > 0) {
        CUTEST_creport(&status, calls, time);
    } else {
        for (i = 4; i < 7; i++)
            calls[i] = 0.0;
        CUTEST_ureport(&status, calls, time);
    }
    return status;
}
"#;
