//! Evaluation metrics for predictor feature columns.
//!
//! Every feature column of an evaluated dataset is scored against the labels
//! with a ROC curve and its area:
//! - `roc_curve(labels, scores)`: one point per distinct score threshold,
//!   collinear points dropped, starting at `(0, 0)`.
//! - `roc_auc(curve)`: trapezoidal area under the curve.
//!
//! Notes:
//! - A rate whose denominator is zero (no positives or no negatives) is 0, not NaN.
//! - The area is undefined for a single-class label set and reported as `None`.
//! - Results are keyed by feature name in a `BTreeMap`, so output is ordered.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::engine::dataset::Dataset;
use crate::engine::errors::PredictError;

/// False- and true-positive rates at decreasing score thresholds.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
}

/// Metrics of one feature column.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureMetrics {
    #[cfg_attr(feature = "serde", serde(rename = "ROC"))]
    pub roc: RocCurve,
    #[cfg_attr(feature = "serde", serde(rename = "AUC"))]
    pub auc: Option<f64>,
}

pub type FeatureResults = BTreeMap<String, FeatureMetrics>;

/// Persisted evaluation of one prediction run.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationResults {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub train_results: FeatureResults,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub test_results: Option<FeatureResults>,
}

impl EvaluationResults {
    /// Results stamped with the current time.
    pub fn new(train_results: FeatureResults, test_results: Option<FeatureResults>) -> Self {
        let now = Utc::now();
        Self {
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
            train_results,
            test_results,
        }
    }
}

/// ROC curve of `scores` against binary `labels`.
pub fn roc_curve(labels: &[u8], scores: &[f64]) -> Result<RocCurve, PredictError> {
    if labels.len() != scores.len() {
        return Err(PredictError::Internal(format!(
            "{} labels but {} scores",
            labels.len(),
            scores.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(PredictError::Numerical(format!("non-finite score {}", bad)));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));

    // Cumulative counts at the last row of each distinct score.
    let mut tps: Vec<f64> = Vec::new();
    let mut fps: Vec<f64> = Vec::new();
    let (mut tp, mut fp) = (0.0, 0.0);
    for (k, &i) in order.iter().enumerate() {
        if labels[i] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_value = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_value {
            tps.push(tp);
            fps.push(fp);
        }
    }

    // Drop points collinear with their neighbours.
    if tps.len() > 2 {
        let keep: Vec<usize> = (0..tps.len())
            .filter(|&k| {
                k == 0
                    || k + 1 == tps.len()
                    || fps[k + 1] - 2.0 * fps[k] + fps[k - 1] != 0.0
                    || tps[k + 1] - 2.0 * tps[k] + tps[k - 1] != 0.0
            })
            .collect();
        tps = keep.iter().map(|&k| tps[k]).collect();
        fps = keep.iter().map(|&k| fps[k]).collect();
    }

    let rate = |counts: &[f64], total: f64| -> Vec<f64> {
        std::iter::once(0.0)
            .chain(counts.iter().map(|c| if total > 0.0 { c / total } else { 0.0 }))
            .collect()
    };
    Ok(RocCurve {
        fpr: rate(&fps, fp),
        tpr: rate(&tps, tp),
    })
}

/// Trapezoidal area under `curve`.
pub fn roc_auc(curve: &RocCurve) -> f64 {
    curve
        .fpr
        .windows(2)
        .zip(curve.tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

/// Curve and area of one feature column.
pub fn feature_metrics(labels: &[u8], scores: &[f64]) -> Result<FeatureMetrics, PredictError> {
    let roc = roc_curve(labels, scores)?;
    let positives = labels.iter().filter(|l| **l == 1).count();
    let auc = (positives > 0 && positives < labels.len()).then(|| roc_auc(&roc));
    Ok(FeatureMetrics { roc, auc })
}

/// Metrics of every feature column of `dataset`.
pub fn evaluate_dataset(dataset: &Dataset) -> Result<FeatureResults, PredictError> {
    dataset
        .columns()
        .iter()
        .map(|column| {
            let metrics = feature_metrics(dataset.labels(), &column.values)?;
            Ok((column.name.clone(), metrics))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::NodeId;

    #[test]
    fn curve_matches_reference_example() {
        let curve = roc_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
        assert!((roc_auc(&curve) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn tied_scores_share_one_point() {
        let curve = roc_curve(&[1, 0, 1, 0], &[0.5, 0.5, 0.5, 0.5]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0]);
        assert!((roc_auc(&curve) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn collinear_points_are_dropped() {
        // Perfect ranking walks up the tpr axis first.
        let curve = roc_curve(&[1, 1, 1, 0, 0], &[0.9, 0.8, 0.7, 0.2, 0.1]).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0 / 3.0, 1.0, 1.0]);
        assert_eq!(roc_auc(&curve), 1.0);
    }

    #[test]
    fn single_class_has_no_area() {
        let m = feature_metrics(&[0, 0, 0], &[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(m.auc, None);
        assert!(m.roc.tpr.iter().all(|v| *v == 0.0));
        assert!(m.roc.fpr.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        assert!(matches!(
            roc_curve(&[0, 1], &[f64::NAN, 1.0]),
            Err(PredictError::Numerical(_))
        ));
        assert!(roc_curve(&[0, 1], &[1.0]).is_err());
    }

    #[test]
    fn dataset_columns_are_evaluated_by_name() {
        let pairs = vec![(NodeId(0), NodeId(1)), (NodeId(1), NodeId(2)), (NodeId(2), NodeId(0))];
        let mut d = Dataset::new(pairs, vec![1, 0, 0]).unwrap();
        d.push_column("Jaccard", vec![0.9, 0.1, 0.2]).unwrap();
        d.push_column("CommonNeighbors", vec![0.0, 1.0, 0.0]).unwrap();
        let results = evaluate_dataset(&d).unwrap();
        assert_eq!(
            results.keys().collect::<Vec<_>>(),
            vec!["CommonNeighbors", "Jaccard"]
        );
        assert_eq!(results["Jaccard"].auc, Some(1.0));
        assert_eq!(results["CommonNeighbors"].auc, Some(0.25));
    }

    #[test]
    fn timestamp_is_recent() {
        let r = EvaluationResults::new(FeatureResults::new(), None);
        assert!(r.timestamp > 1.6e9);
        assert!(r.test_results.is_none());
    }
}
