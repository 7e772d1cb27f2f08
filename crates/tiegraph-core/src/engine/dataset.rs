//! Labeled node-pair datasets with named feature columns.

use super::errors::PredictError;
use super::graph::NodeId;

pub type NodePair = (NodeId, NodeId);

/// One named numeric feature over all rows of a dataset.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Row-major feature matrix selected from a dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn width(&self) -> usize {
        self.names.len()
    }
}

/// `(node_pair, label)` rows plus feature columns added by later stages.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    pairs: Vec<NodePair>,
    labels: Vec<u8>,
    columns: Vec<FeatureColumn>,
}

impl Dataset {
    pub fn new(pairs: Vec<NodePair>, labels: Vec<u8>) -> Result<Self, PredictError> {
        if pairs.len() != labels.len() {
            return Err(PredictError::Internal(format!(
                "{} node pairs but {} labels",
                pairs.len(),
                labels.len()
            )));
        }
        Ok(Self {
            pairs,
            labels,
            columns: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[NodePair] {
        &self.pairs
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l == 1).count()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&FeatureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Appends a feature column; a column of the same name is replaced.
    pub fn push_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), PredictError> {
        if values.len() != self.pairs.len() {
            return Err(PredictError::Internal(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.pairs.len()
            )));
        }
        let column = FeatureColumn {
            name: name.to_string(),
            values,
        };
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Row-major matrix of the columns accepted by `include`, in column order.
    pub fn feature_matrix<F>(&self, include: F) -> FeatureMatrix
    where
        F: Fn(&str) -> bool,
    {
        let selected: Vec<&FeatureColumn> =
            self.columns.iter().filter(|c| include(&c.name)).collect();
        let rows = (0..self.len())
            .map(|r| selected.iter().map(|c| c.values[r]).collect())
            .collect();
        FeatureMatrix {
            names: selected.iter().map(|c| c.name.clone()).collect(),
            rows,
        }
    }

    /// A dataset holding only the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            pairs: indices.iter().map(|&i| self.pairs[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| FeatureColumn {
                    name: c.name.clone(),
                    values: indices.iter().map(|&i| c.values[i]).collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        let pairs = vec![(NodeId(1), NodeId(2)), (NodeId(2), NodeId(3)), (NodeId(3), NodeId(1))];
        let mut d = Dataset::new(pairs, vec![1, 0, 0]).unwrap();
        d.push_column("Jaccard", vec![0.5, 0.0, 0.25]).unwrap();
        d.push_column("BalanceTheory.021C", vec![1.0, 0.0, 0.0]).unwrap();
        d
    }

    #[test]
    fn feature_matrix_filters_columns() {
        let d = dataset();
        let m = d.feature_matrix(|name| !name.starts_with("BalanceTheory"));
        assert_eq!(m.names, vec!["Jaccard".to_string()]);
        assert_eq!(m.rows, vec![vec![0.5], vec![0.0], vec![0.25]]);
    }

    #[test]
    fn columns_must_match_row_count() {
        let mut d = dataset();
        assert!(d.push_column("Salton", vec![1.0]).is_err());
        d.push_column("Jaccard", vec![0.0; 3]).unwrap();
        assert_eq!(d.columns().len(), 2);
        assert_eq!(d.column("Jaccard").unwrap().values, vec![0.0; 3]);
    }

    #[test]
    fn select_rows_keeps_columns_aligned() {
        let d = dataset().select_rows(&[2, 0]);
        assert_eq!(d.labels(), &[0, 1]);
        assert_eq!(d.column("Jaccard").unwrap().values, vec![0.25, 0.5]);
        assert_eq!(d.positives(), 1);
    }
}
