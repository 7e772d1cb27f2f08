//! Binary classifiers over dataset feature matrices.
//!
//! Every classifier implements [`Classifier`]: `fit` on row-major features and
//! 0/1 labels, then `predict_proba` returning `P(label = 1)` per row. The
//! concrete models assume validated input with both classes present;
//! [`ClassifierModel`] performs that validation and answers single-class
//! training sets with a constant probability.

mod bayes;
mod linear;
mod neighbors;
mod tree;

use std::fmt;
use std::str::FromStr;

use super::errors::PredictError;

pub use bayes::GaussianNaiveBayes;
pub use linear::{LogisticRegression, SupportVector};
pub use neighbors::KNeighbors;
pub use tree::{DecisionTree, GradientBoosting, RandomForest};

/// A probabilistic binary classifier.
pub trait Classifier: Send + fmt::Debug {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError>;

    /// Probability of label 1 for each row of `x`.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClassifierKind {
    DecisionTree,
    RandomForest,
    GradientBoosting,
    LogisticRegression,
    KNeighbors,
    GaussianNB,
    SupportVector,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 7] = [
        ClassifierKind::DecisionTree,
        ClassifierKind::RandomForest,
        ClassifierKind::GradientBoosting,
        ClassifierKind::LogisticRegression,
        ClassifierKind::KNeighbors,
        ClassifierKind::GaussianNB,
        ClassifierKind::SupportVector,
    ];

    pub fn designation(&self) -> &'static str {
        match self {
            ClassifierKind::DecisionTree => "DecisionTree",
            ClassifierKind::RandomForest => "RandomForest",
            ClassifierKind::GradientBoosting => "GradientBoosting",
            ClassifierKind::LogisticRegression => "LogisticRegression",
            ClassifierKind::KNeighbors => "KNeighbors",
            ClassifierKind::GaussianNB => "GaussianNB",
            ClassifierKind::SupportVector => "SupportVector",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.designation())
    }
}

impl FromStr for ClassifierKind {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassifierKind::ALL
            .into_iter()
            .find(|k| k.designation() == s)
            .ok_or_else(|| PredictError::InvalidParameter(format!("unknown classifier '{}'", s)))
    }
}

/// Hyper-parameters shared by the classifier family.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSettings {
    /// Neighbours consulted by k-NN.
    pub k: usize,
    /// Trees in forests and boosting rounds.
    pub n_estimators: usize,
    /// Depth limit of decision trees; boosting defaults to 3 when unset.
    pub max_depth: Option<usize>,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            k: 5,
            n_estimators: 100,
            max_depth: None,
            learning_rate: 0.1,
            seed: 42,
        }
    }
}

impl ClassifierSettings {
    pub fn validate(&self) -> Result<(), PredictError> {
        if self.k == 0 {
            return Err(PredictError::InvalidParameter("k must be at least 1".into()));
        }
        if self.n_estimators == 0 {
            return Err(PredictError::InvalidParameter("n_estimators must be at least 1".into()));
        }
        if self.max_depth == Some(0) {
            return Err(PredictError::InvalidParameter("max_depth must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PredictError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Checks a training set and returns its feature width.
fn check_training(x: &[Vec<f64>], y: &[u8]) -> Result<usize, PredictError> {
    if x.len() != y.len() {
        return Err(PredictError::Internal(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(PredictError::MissingData("empty training set".into()));
    }
    if let Some(bad) = y.iter().find(|l| **l > 1) {
        return Err(PredictError::InvalidParameter(format!("label {} is not binary", bad)));
    }
    let width = x[0].len();
    check_rows(x, width)?;
    Ok(width)
}

fn check_rows(x: &[Vec<f64>], width: usize) -> Result<(), PredictError> {
    for (i, row) in x.iter().enumerate() {
        if row.len() != width {
            return Err(PredictError::Internal(format!(
                "row {} has {} features, expected {}",
                i,
                row.len(),
                width
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PredictError::Numerical(format!("row {} has a non-finite feature", i)));
        }
    }
    Ok(())
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Per-feature standardisation to zero mean and unit variance.
#[derive(Debug, Clone, Default)]
pub(crate) struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    pub(crate) fn fit(x: &[Vec<f64>]) -> Self {
        let width = x.first().map_or(0, Vec::len);
        let n = x.len().max(1) as f64;
        let mut mean = vec![0.0; width];
        for row in x {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scale = vec![0.0; width];
        for row in x {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        // Constant columns keep their scale.
        for s in scale.iter_mut() {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }
        Self { mean, scale }
    }

    pub(crate) fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

fn build(kind: ClassifierKind, settings: &ClassifierSettings) -> Box<dyn Classifier> {
    match kind {
        ClassifierKind::DecisionTree => Box::new(DecisionTree::new(settings.max_depth)),
        ClassifierKind::RandomForest => Box::new(RandomForest::new(
            settings.n_estimators,
            settings.max_depth,
            settings.seed,
        )),
        ClassifierKind::GradientBoosting => Box::new(GradientBoosting::new(
            settings.n_estimators,
            settings.learning_rate,
            settings.max_depth.unwrap_or(3),
        )),
        ClassifierKind::LogisticRegression => Box::new(LogisticRegression::default()),
        ClassifierKind::KNeighbors => Box::new(KNeighbors::new(settings.k)),
        ClassifierKind::GaussianNB => Box::new(GaussianNaiveBayes::default()),
        ClassifierKind::SupportVector => Box::new(SupportVector::new(settings.seed)),
    }
}

#[derive(Debug)]
enum Fitted {
    Unfitted,
    Constant(f64),
    Model(Box<dyn Classifier>),
}

/// A classifier of a given kind with input validation and single-class handling.
#[derive(Debug)]
pub struct ClassifierModel {
    kind: ClassifierKind,
    settings: ClassifierSettings,
    width: usize,
    fitted: Fitted,
}

impl ClassifierModel {
    pub fn new(kind: ClassifierKind, settings: ClassifierSettings) -> Result<Self, PredictError> {
        settings.validate()?;
        Ok(Self {
            kind,
            settings,
            width: 0,
            fitted: Fitted::Unfitted,
        })
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn designation(&self) -> &'static str {
        self.kind.designation()
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn is_fitted(&self) -> bool {
        !matches!(self.fitted, Fitted::Unfitted)
    }
}

impl Classifier for ClassifierModel {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8]) -> Result<(), PredictError> {
        self.width = check_training(x, y)?;
        let positives = y.iter().filter(|l| **l == 1).count();
        if positives == 0 || positives == y.len() {
            let p = if positives == 0 { 0.0 } else { 1.0 };
            tracing::warn!(
                classifier = self.designation(),
                rows = y.len(),
                "single-class training set, using a constant model"
            );
            self.fitted = Fitted::Constant(p);
            return Ok(());
        }
        let mut model = build(self.kind, &self.settings);
        model.fit(x, y)?;
        tracing::debug!(
            classifier = self.designation(),
            rows = y.len(),
            positives,
            features = self.width,
            "classifier trained"
        );
        self.fitted = Fitted::Model(model);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, PredictError> {
        match &self.fitted {
            Fitted::Unfitted => Err(PredictError::Internal(format!(
                "{} used before fit",
                self.designation()
            ))),
            Fitted::Constant(p) => {
                check_rows(x, self.width)?;
                Ok(vec![*p; x.len()])
            }
            Fitted::Model(model) => {
                check_rows(x, self.width)?;
                let probabilities = model.predict_proba(x)?;
                Ok(probabilities.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
            }
        }
    }
}
