//! Identifiability metric: how well estimated latents match the true sources
//! up to permutation and sign.

use std::str::FromStr;

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl FromStr for CorrelationMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            other => anyhow::bail!("unknown correlation method `{other}`"),
        }
    }
}

fn pearson(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let a = &a - a.mean().unwrap_or(0.0);
    let b = &b - b.mean().unwrap_or(0.0);
    a.dot(&b) / (a.dot(&a) * b.dot(&b)).sqrt()
}

/// Ranks starting at 1, ties get the mean of the ranks they span.
fn ranks(values: ArrayView1<f64>) -> Array1<f64> {
    let order: Vec<usize> = (0..values.len())
        .sorted_by(|&i, &j| values[i].total_cmp(&values[j]))
        .collect();

    let mut ranks = Array1::zeros(values.len());
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// `|corr(x[:, i], y[:, j])|` for every column pair. Undefined correlations
/// (constant columns) are 0.
pub fn abs_correlation(x: ArrayView2<f64>, y: ArrayView2<f64>, method: CorrelationMethod) -> Array2<f64> {
    let prepare = |a: ArrayView2<f64>| -> Vec<Array1<f64>> {
        a.columns()
            .into_iter()
            .map(|col| match method {
                CorrelationMethod::Pearson => col.to_owned(),
                CorrelationMethod::Spearman => ranks(col),
            })
            .collect()
    };
    let xs = prepare(x);
    let ys = prepare(y);

    Array2::from_shape_fn((xs.len(), ys.len()), |(i, j)| {
        let c = pearson(xs[i].view(), ys[j].view()).abs();
        if c.is_finite() {
            c
        } else {
            0.0
        }
    })
}

/// Minimum-cost assignment of rows to columns (Hungarian algorithm with
/// potentials). Returns `(row, col)` pairs, `min(rows, cols)` of them, sorted
/// by row.
pub fn linear_sum_assignment(cost: ArrayView2<f64>) -> Vec<(usize, usize)> {
    let (rows, cols) = cost.dim();
    if rows > cols {
        let mut pairs: Vec<(usize, usize)> = linear_sum_assignment(cost.t())
            .into_iter()
            .map(|(c, r)| (r, c))
            .collect();
        pairs.sort_unstable();
        return pairs;
    }

    // 1-based potentials; column 0 is the virtual start
    let (n, m) = (rows, cols);
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut assigned = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        assigned[0] = i;
        let mut j0 = 0;
        let mut min_to = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = assigned[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[[i0 - 1, j - 1]] - u[i0] - v[j];
                if reduced < min_to[j] {
                    min_to[j] = reduced;
                    way[j] = j0;
                }
                if min_to[j] < delta {
                    delta = min_to[j];
                    j1 = j;
                }
            }
            for j in 0..=m {
                if used[j] {
                    u[assigned[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_to[j] -= delta;
                }
            }
            j0 = j1;
            if assigned[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            assigned[j0] = assigned[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=m)
        .filter(|&j| assigned[j] != 0)
        .map(|j| (assigned[j] - 1, j - 1))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Mean absolute correlation between the columns of `x` and `y` under the
/// column matching that maximizes it.
pub fn mean_corr_coef(x: ArrayView2<f64>, y: ArrayView2<f64>, method: CorrelationMethod) -> f64 {
    let cc = abs_correlation(x, y, method);
    let pairs = linear_sum_assignment((-&cc).view());
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.iter().map(|&(i, j)| cc[[i, j]]).sum::<f64>() / pairs.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random(rows: usize, cols: usize) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(0);
        Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn permuted_and_flipped_sources_score_one() {
        let s = random(200, 3);
        let mut z = s.clone();
        z.column_mut(0).assign(&s.column(2).mapv(|v| -2.0 * v));
        z.column_mut(1).assign(&s.column(0).mapv(|v| v + 1.0));
        z.column_mut(2).assign(&s.column(1));

        for method in [CorrelationMethod::Pearson, CorrelationMethod::Spearman] {
            let score = mean_corr_coef(s.view(), z.view(), method);
            assert!((score - 1.0).abs() < 1e-9, "{method:?}: {score}");
        }
    }

    #[test]
    fn independent_latents_score_low() {
        let s = random(2000, 2);
        let z = random(2000, 2).mapv(|v| v * v);
        let z = Array2::from_shape_fn((2000, 2), |(i, j)| z[[(i * 7 + 3) % 2000, j]]);
        assert!(mean_corr_coef(s.view(), z.view(), CorrelationMethod::Pearson) < 0.2);
    }

    #[test]
    fn spearman_is_invariant_to_monotone_maps() {
        let s = random(100, 2);
        let z = s.mapv(|v| v.powi(3) + v);
        assert!((mean_corr_coef(s.view(), z.view(), CorrelationMethod::Spearman) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_column_counts_as_zero() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let y = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let score = mean_corr_coef(x.view(), y.view(), CorrelationMethod::Pearson);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn assignment_is_optimal() {
        let cost = array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        let pairs = linear_sum_assignment(cost.view());
        assert_eq!(pairs, vec![(0, 1), (1, 0), (2, 2)]);
        let total: f64 = pairs.iter().map(|&(i, j)| cost[[i, j]]).sum();
        assert_eq!(total, 5.0);
    }

    #[test]
    fn rectangular_assignment() {
        let wide = array![[1.0, 9.0, 0.5], [9.0, 1.0, 9.0]];
        assert_eq!(linear_sum_assignment(wide.view()), vec![(0, 2), (1, 1)]);

        let tall = wide.t().to_owned();
        assert_eq!(linear_sum_assignment(tall.view()), vec![(1, 1), (2, 0)]);
    }

    #[test]
    fn ranks_average_ties() {
        let r = ranks(array![3.0, 1.0, 3.0, 2.0].view());
        assert_eq!(r, array![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn parse_method() {
        assert_eq!("spearman".parse::<CorrelationMethod>().unwrap(), CorrelationMethod::Spearman);
        assert!("kendall".parse::<CorrelationMethod>().is_err());
    }
}
