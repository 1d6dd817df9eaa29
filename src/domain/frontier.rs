use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// How the current frontier values were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierMethod {
    #[default]
    None,
    /// Recomputed locally after the model weights changed.
    Approximate,
    /// As returned by the optimizer.
    Optimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationMethod {
    /// Interpolate between frontier points.
    Approximate,
    /// Ask the optimizer for the portfolio at the target return.
    Exact,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierPoint {
    pub mu: f64,
    pub std: f64,
    pub x: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub x: DVector<f64>,
    pub status: String,
    pub std: f64,
    pub mu: f64,
}

/// Where a value falls relative to a sorted frontier column.
enum Position<'a> {
    First(&'a FrontierPoint),
    Last(&'a FrontierPoint),
    Between(&'a FrontierPoint, &'a FrontierPoint),
}

/// Efficient frontier, ordered by increasing return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontier {
    points: Vec<FrontierPoint>,
}

impl Frontier {
    pub fn new(points: Vec<FrontierPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[FrontierPoint] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut [FrontierPoint] {
        &mut self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return of the first and last point.
    pub fn mu_range(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.mu, self.points.last()?.mu))
    }

    /// Risk of the first and last point.
    pub fn std_range(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.std, self.points.last()?.std))
    }

    fn locate(&self, value: f64, key: impl Fn(&FrontierPoint) -> f64) -> Option<Position<'_>> {
        let index = self.points.partition_point(|p| key(p) < value);
        if index == self.points.len() {
            Some(Position::Last(self.points.last()?))
        } else if index == 0 {
            Some(Position::First(self.points.first()?))
        } else {
            Some(Position::Between(&self.points[index - 1], &self.points[index]))
        }
    }

    /// Return on the frontier at risk level `std`.
    pub fn mu_at_std(&self, std: f64) -> Option<f64> {
        Some(match self.locate(std, |p| p.std)? {
            Position::First(p) | Position::Last(p) => p.mu,
            Position::Between(left, right) => {
                let eta = (std - left.std) / (right.std - left.std);
                (1.0 - eta) * left.mu + eta * right.mu
            }
        })
    }

    /// Linear interpolation of holdings and risk at return `mu`.
    pub fn approximate(&self, mu: f64) -> Option<Recommendation> {
        let (x, std) = match self.locate(mu, |p| p.mu)? {
            Position::First(p) | Position::Last(p) => (p.x.clone(), p.std),
            Position::Between(left, right) => {
                let eta = (mu - left.mu) / (right.mu - left.mu);
                (
                    &left.x * (1.0 - eta) + &right.x * eta,
                    (1.0 - eta) * left.std + eta * right.std,
                )
            }
        };
        Some(Recommendation {
            x,
            status: "optimal".to_string(),
            std,
            mu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    fn frontier() -> Frontier {
        Frontier::new(vec![
            FrontierPoint { mu: 0.01, std: 0.10, x: dvector![1.0, 0.0] },
            FrontierPoint { mu: 0.02, std: 0.20, x: dvector![0.5, 0.5] },
            FrontierPoint { mu: 0.04, std: 0.40, x: dvector![0.0, 1.0] },
        ])
    }

    #[test]
    fn test_interpolates_between_points() {
        let rec = frontier().approximate(0.03).unwrap();
        assert!((rec.std - 0.30).abs() < 1e-12);
        assert!((rec.x[0] - 0.25).abs() < 1e-12);
        assert!((rec.x[1] - 0.75).abs() < 1e-12);
        assert_eq!(rec.status, "optimal");
    }

    #[test]
    fn test_clamps_outside_range() {
        let f = frontier();
        let low = f.approximate(-1.0).unwrap();
        assert_eq!(low.x, dvector![1.0, 0.0]);
        assert_eq!(low.mu, -1.0);

        let high = f.approximate(1.0).unwrap();
        assert_eq!(high.x, dvector![0.0, 1.0]);
        assert_eq!(high.std, 0.40);

        // exact match on an interior point
        let mid = f.approximate(0.02).unwrap();
        assert!((mid.x[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_mu_at_std() {
        let f = frontier();
        assert!((f.mu_at_std(0.15).unwrap() - 0.015).abs() < 1e-12);
        assert_eq!(f.mu_at_std(0.01), Some(0.01));
        assert_eq!(f.mu_at_std(5.0), Some(0.04));
        assert_eq!(Frontier::default().mu_at_std(0.1), None);
    }

    #[test]
    fn test_ranges() {
        let f = frontier();
        assert_eq!(f.mu_range(), Some((0.01, 0.04)));
        assert_eq!(f.std_range(), Some((0.10, 0.40)));
        assert_eq!(Frontier::default().mu_range(), None);
    }
}
