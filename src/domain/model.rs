//! Factor risk model.
//!
//! Asset covariance is `diag(Q) + F D Fᵀ`, where `F` holds the factor
//! loadings and `D` the factor covariance. The API may send `D` or its
//! inverse `Di`; whichever is missing is derived lazily and cached.

use crate::utils::error::{OptimumError, Result};
use nalgebra::{DMatrix, DVector};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Model as it travels over the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    pub r: Vec<f64>,
    #[serde(rename = "F")]
    pub f: Vec<Vec<f64>>,
    #[serde(rename = "Q")]
    pub q: Vec<f64>,
    #[serde(rename = "D", default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Vec<Vec<f64>>>,
    #[serde(rename = "Di", default, skip_serializing_if = "Option::is_none")]
    pub di: Option<Vec<Vec<f64>>>,
}

/// Which representation of the factor covariance is given.
#[derive(Debug, Clone)]
pub enum FactorCovariance {
    Direct(DMatrix<f64>),
    Inverse(DMatrix<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelField {
    R,
    F,
    Q,
    D,
    Di,
    Std,
}

impl ModelField {
    pub fn key(self) -> &'static str {
        match self {
            ModelField::R => "r",
            ModelField::F => "F",
            ModelField::Q => "Q",
            ModelField::D => "D",
            ModelField::Di => "Di",
            ModelField::Std => "std",
        }
    }
}

const DEFAULT_FIELDS: [ModelField; 5] = [
    ModelField::R,
    ModelField::D,
    ModelField::F,
    ModelField::Q,
    ModelField::Std,
];

/// Parameters of the unconstrained (budget-only) efficient frontier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnconstrainedFrontier {
    pub a: f64,
    pub mu_star: f64,
    pub sigma_0: f64,
}

#[derive(Debug, Clone)]
pub struct Model {
    r: DVector<f64>,
    f: DMatrix<f64>,
    q: DVector<f64>,
    d: OnceCell<DMatrix<f64>>,
    di: OnceCell<DMatrix<f64>>,
    std: OnceCell<DVector<f64>>,
}

impl Model {
    pub fn new(
        r: DVector<f64>,
        f: DMatrix<f64>,
        q: DVector<f64>,
        covariance: FactorCovariance,
    ) -> Result<Self> {
        let n = r.len();
        if f.nrows() != n || q.len() != n {
            return Err(OptimumError::model(format!(
                "r has {} entries but F has {} rows and Q has {} entries",
                n,
                f.nrows(),
                q.len()
            )));
        }

        let mut model = Self {
            r,
            f,
            q,
            d: OnceCell::new(),
            di: OnceCell::new(),
            std: OnceCell::new(),
        };
        match covariance {
            FactorCovariance::Direct(d) => model.set_d(d)?,
            FactorCovariance::Inverse(di) => model.set_di(di)?,
        }
        Ok(model)
    }

    pub fn from_data(data: &ModelData) -> Result<Self> {
        let n = data.r.len();
        let r = DVector::from_column_slice(&data.r);
        let q = DVector::from_column_slice(&data.q);
        let f = matrix_from_rows("F", &data.f, n)?;

        let covariance = match (&data.d, &data.di) {
            (Some(_), Some(_)) => {
                return Err(OptimumError::model("Di and D cannot be both in model data"))
            }
            (Some(d), None) => FactorCovariance::Direct(matrix_from_rows("D", d, d.len())?),
            (None, Some(di)) => FactorCovariance::Inverse(matrix_from_rows("Di", di, di.len())?),
            (None, None) => return Err(OptimumError::model("Model data must contain D or Di")),
        };

        Self::new(r, f, q, covariance)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let data: ModelData = serde_json::from_value(value.clone())?;
        Self::from_data(&data)
    }

    /// Weighted sum of models, combining `Di` instead of `D` when `via_inverse` is set.
    pub fn blend<'a, I>(parts: I, via_inverse: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, &'a Model)>,
    {
        let mut parts = parts.into_iter();
        let (w0, first) = parts
            .next()
            .ok_or_else(|| OptimumError::model("Cannot blend an empty set of models"))?;

        let mut r = &first.r * w0;
        let mut f = &first.f * w0;
        let mut q = &first.q * w0;
        let mut cov = if via_inverse {
            first.di()? * w0
        } else {
            first.d()? * w0
        };

        for (w, model) in parts {
            if model.r.len() != r.len() || model.f.shape() != f.shape() {
                return Err(OptimumError::model("Cannot blend models of different shapes"));
            }
            r += &model.r * w;
            f += &model.f * w;
            q += &model.q * w;
            cov += if via_inverse {
                model.di()? * w
            } else {
                model.d()? * w
            };
        }

        let covariance = if via_inverse {
            FactorCovariance::Inverse(cov)
        } else {
            FactorCovariance::Direct(cov)
        };
        Self::new(r, f, q, covariance)
    }

    pub fn num_assets(&self) -> usize {
        self.r.len()
    }

    pub fn num_factors(&self) -> usize {
        self.f.ncols()
    }

    pub fn r(&self) -> &DVector<f64> {
        &self.r
    }

    pub fn f(&self) -> &DMatrix<f64> {
        &self.f
    }

    pub fn q(&self) -> &DVector<f64> {
        &self.q
    }

    pub fn d(&self) -> Result<&DMatrix<f64>> {
        self.d.get_or_try_init(|| {
            let di = self
                .di
                .get()
                .ok_or_else(|| OptimumError::model("Model has neither D nor Di"))?;
            invert_symmetric("Di", di)
        })
    }

    pub fn di(&self) -> Result<&DMatrix<f64>> {
        self.di.get_or_try_init(|| {
            let d = self
                .d
                .get()
                .ok_or_else(|| OptimumError::model("Model has neither D nor Di"))?;
            invert_symmetric("D", d)
        })
    }

    pub fn set_d(&mut self, d: DMatrix<f64>) -> Result<()> {
        self.check_factor_shape("D", &d)?;
        self.d = OnceCell::with_value(d);
        self.di = OnceCell::new();
        self.std = OnceCell::new();
        Ok(())
    }

    pub fn set_di(&mut self, di: DMatrix<f64>) -> Result<()> {
        self.check_factor_shape("Di", &di)?;
        self.di = OnceCell::with_value(di);
        self.d = OnceCell::new();
        self.std = OnceCell::new();
        Ok(())
    }

    /// Per-asset standard deviation, `sqrt(Q + diag(F D Fᵀ))`.
    pub fn std(&self) -> Result<&DVector<f64>> {
        self.std.get_or_try_init(|| {
            let fd = &self.f * self.d()?;
            Ok(DVector::from_fn(self.r.len(), |i, _| {
                (self.q[i] + fd.row(i).dot(&self.f.row(i))).sqrt()
            }))
        })
    }

    /// Full asset covariance matrix.
    pub fn covariance(&self) -> Result<DMatrix<f64>> {
        let fdft = &self.f * self.d()? * self.f.transpose();
        Ok(DMatrix::from_diagonal(&self.q) + fdft)
    }

    /// JSON object with the requested fields; `normalize` rescales variances
    /// by the largest asset variance.
    pub fn to_data(&self, fields: Option<&[ModelField]>, normalize: bool) -> Result<Map<String, Value>> {
        let alpha = if normalize {
            let max_std = self.std()?.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            max_std * max_std
        } else {
            1.0
        };

        let fields = fields.unwrap_or(&DEFAULT_FIELDS);
        let mut map = Map::new();
        for field in fields {
            let value = match field {
                ModelField::R => vector_to_value(&self.r),
                ModelField::F => matrix_to_value(&self.f),
                ModelField::Q => vector_to_value(&(&self.q / alpha)),
                ModelField::D => matrix_to_value(&(self.d()? / alpha)),
                ModelField::Di => matrix_to_value(&(self.di()? * alpha)),
                ModelField::Std => vector_to_value(self.std()?),
            };
            map.insert(field.key().to_string(), value);
        }
        Ok(map)
    }

    /// Return and standard deviation of holdings `x`, both per unit of total value.
    pub fn return_and_variance(&self, x: &DVector<f64>) -> Result<(f64, f64)> {
        if x.len() != self.r.len() {
            return Err(OptimumError::model(format!(
                "Portfolio has {} entries but model has {} assets",
                x.len(),
                self.r.len()
            )));
        }

        let value = x.sum();
        if value < 0.0 {
            tracing::warn!("Total portfolio is negative");
        }

        let mu = x.dot(&self.r) / value;
        let v = self.f.transpose() * x;
        let variance = self.q.component_mul(x).dot(x) + (self.d()? * &v).dot(&v);
        Ok((mu, variance.sqrt() / value.abs()))
    }

    /// Frontier of the problem constrained only by `Σx = x_bar`.
    ///
    /// Assets with zero variance are left out so that cash-like padding does
    /// not make the covariance singular.
    pub fn unconstrained_frontier(&self, x_bar: f64) -> Result<UnconstrainedFrontier> {
        // TODO: use the matrix inversion lemma on diag(Q) + F D Fᵀ instead of
        // assembling the dense covariance.
        let std = self.std()?;
        let active: Vec<usize> = (0..self.r.len()).filter(|&i| std[i] > 0.0).collect();
        if active.len() < 2 {
            return Err(OptimumError::model(
                "At least two assets with positive variance are required",
            ));
        }

        let cov = self.covariance()?;
        let q = cov.select_rows(&active).select_columns(&active);
        let b = DMatrix::from_fn(active.len(), 2, |i, j| if j == 0 { self.r[active[i]] } else { 1.0 });

        let qib = q
            .lu()
            .solve(&b)
            .ok_or_else(|| OptimumError::model("Asset covariance is singular"))?;
        let bsb_inv = (b.transpose() * qib)
            .try_inverse()
            .ok_or_else(|| OptimumError::model("Returns are collinear with the budget"))?;

        let a = bsb_inv[(0, 0)];
        let b = -bsb_inv[(0, 1)];
        let c = bsb_inv[(1, 1)];
        Ok(UnconstrainedFrontier {
            a,
            mu_star: b * x_bar / a,
            sigma_0: (c - b * b / a).sqrt() * x_bar,
        })
    }

    fn check_factor_shape(&self, name: &str, m: &DMatrix<f64>) -> Result<()> {
        let k = self.f.ncols();
        if m.nrows() != k || m.ncols() != k {
            return Err(OptimumError::model(format!(
                "{} must be {}x{}, got {}x{}",
                name,
                k,
                k,
                m.nrows(),
                m.ncols()
            )));
        }
        Ok(())
    }
}

fn invert_symmetric(name: &str, m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let inv = m
        .clone()
        .try_inverse()
        .ok_or_else(|| OptimumError::model(format!("{} is singular", name)))?;
    Ok((&inv + inv.transpose()) * 0.5)
}

fn matrix_from_rows(name: &str, rows: &[Vec<f64>], nrows: usize) -> Result<DMatrix<f64>> {
    if rows.len() != nrows {
        return Err(OptimumError::model(format!(
            "{} has {} rows, expected {}",
            name,
            rows.len(),
            nrows
        )));
    }
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != ncols) {
        return Err(OptimumError::model(format!("{} has rows of different lengths", name)));
    }
    Ok(DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}

pub(crate) fn vector_to_value(v: &DVector<f64>) -> Value {
    Value::from(v.iter().cloned().map(finite_or_null).collect::<Vec<_>>())
}

pub(crate) fn matrix_to_value(m: &DMatrix<f64>) -> Value {
    Value::from(
        m.row_iter()
            .map(|row| Value::from(row.iter().cloned().map(finite_or_null).collect::<Vec<_>>()))
            .collect::<Vec<_>>(),
    )
}

/// JSON has no infinities; unbounded entries go out as `null`.
pub(crate) fn finite_or_null(x: f64) -> Value {
    if x.is_finite() {
        Value::from(x)
    } else {
        Value::Null
    }
}
