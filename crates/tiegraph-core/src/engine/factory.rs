//! Predictor descriptors and the factory that turns them into predictors.
//!
//! A descriptor is declarative: a designation, a feature type and a map of
//! parameters. [`PredictorFactory::create`] dispatches on the feature type and
//! designation to one variant of the closed [`Predictor`] type.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::attributes::{numeric_attribute, AttributeWeightings};
use super::centrality::{PathMethod, KATZ_ALPHA};
use super::classification::{ClassifierKind, ClassifierModel, ClassifierSettings};
use super::dataset::NodePair;
use super::errors::PredictError;
use super::graph::HierarchicalGraph;
use super::similarity::{TopologyIndex, TopologyPredictor};
use super::social_theory::{CollectiveActionParams, ExogenousParams, SocialTheoryPredictor};

/// Category of a selected predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureType {
    #[cfg_attr(feature = "serde", serde(rename = "Topology"))]
    Topology,
    #[cfg_attr(feature = "serde", serde(rename = "Social Theory with endogenous Attributes"))]
    EndogenousSocialTheory,
    #[cfg_attr(feature = "serde", serde(rename = "Social Theory with exogenous Attributes"))]
    ExogenousSocialTheory,
    #[cfg_attr(feature = "serde", serde(rename = "ML-Classifier"))]
    Classifier,
    #[cfg_attr(feature = "serde", serde(rename = "Others"))]
    Others,
}

impl FeatureType {
    pub const ALL: [FeatureType; 5] = [
        FeatureType::Topology,
        FeatureType::EndogenousSocialTheory,
        FeatureType::ExogenousSocialTheory,
        FeatureType::Classifier,
        FeatureType::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Topology => "Topology",
            FeatureType::EndogenousSocialTheory => "Social Theory with endogenous Attributes",
            FeatureType::ExogenousSocialTheory => "Social Theory with exogenous Attributes",
            FeatureType::Classifier => "ML-Classifier",
            FeatureType::Others => "Others",
        }
    }

    pub fn is_social_theory(&self) -> bool {
        matches!(
            self,
            FeatureType::EndogenousSocialTheory | FeatureType::ExogenousSocialTheory
        )
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = PredictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PredictError::InvalidParameter(format!("invalid feature type '{}'", s)))
    }
}

/// One `{attribute, value}` entry of an exogenous predictor's weighting list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeWeighting {
    pub attribute: String,
    pub value: f64,
}

/// A parameter value as stored with a predictor selection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Weightings(Vec<AttributeWeighting>),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<Vec<AttributeWeighting>> for ParamValue {
    fn from(value: Vec<AttributeWeighting>) -> Self {
        ParamValue::Weightings(value)
    }
}

/// String-keyed predictor parameters with typed accessors.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PredictorParameters(BTreeMap<String, ParamValue>);

impl PredictorParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn wrong_type(key: &str, expected: &str) -> PredictError {
        PredictError::InvalidParameter(format!("parameter '{}' must be {}", key, expected))
    }

    pub fn number(&self, key: &str) -> Result<Option<f64>, PredictError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Number(v)) if v.is_finite() => Ok(Some(*v)),
            Some(_) => Err(Self::wrong_type(key, "a finite number")),
        }
    }

    pub fn number_or(&self, key: &str, default: f64) -> Result<f64, PredictError> {
        Ok(self.number(key)?.unwrap_or(default))
    }

    /// A non-negative integer parameter.
    pub fn count_or(&self, key: &str, default: usize) -> Result<usize, PredictError> {
        match self.number(key)? {
            None => Ok(default),
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
            Some(_) => Err(Self::wrong_type(key, "a non-negative integer")),
        }
    }

    /// A percentile within `[0, 100]`.
    pub fn percentile_or(&self, key: &str, default: f64) -> Result<f64, PredictError> {
        let value = self.number_or(key, default)?;
        if !(0.0..=100.0).contains(&value) {
            return Err(Self::wrong_type(key, "a percentile within [0, 100]"));
        }
        Ok(value)
    }

    pub fn text(&self, key: &str) -> Result<Option<&str>, PredictError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Text(v)) => Ok(Some(v.as_str())),
            Some(_) => Err(Self::wrong_type(key, "a string")),
        }
    }

    /// The `attribute_weightings` list as a map; empty when absent.
    pub fn weightings(&self) -> Result<AttributeWeightings, PredictError> {
        match self.0.get("attribute_weightings") {
            None => Ok(AttributeWeightings::new()),
            Some(ParamValue::Weightings(list)) => Ok(list
                .iter()
                .map(|w| (w.attribute.clone(), w.value))
                .collect()),
            Some(_) => Err(Self::wrong_type(
                "attribute_weightings",
                "a list of {attribute, value} entries",
            )),
        }
    }
}

/// A predictor selected for a network.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictorDescriptor {
    pub designation: String,
    pub feature_type: FeatureType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub parameters: PredictorParameters,
}

impl PredictorDescriptor {
    pub fn new(designation: &str, feature_type: FeatureType) -> Self {
        Self {
            designation: designation.to_string(),
            feature_type,
            parameters: PredictorParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: PredictorParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    U,
    V,
}

/// Raw numeric attribute of one endpoint of each pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePredictor {
    pub endpoint: Endpoint,
    pub attribute: String,
}

impl AttributePredictor {
    pub fn designation(&self) -> &'static str {
        match self.endpoint {
            Endpoint::U => "UAttribute",
            Endpoint::V => "VAttribute",
        }
    }

    pub fn predict(&self, graph: &HierarchicalGraph, pairs: &[NodePair]) -> Result<Vec<f64>, PredictError> {
        pairs
            .iter()
            .map(|&(u, v)| {
                let id = match self.endpoint {
                    Endpoint::U => u,
                    Endpoint::V => v,
                };
                let node = graph.node(id).ok_or_else(|| PredictError::missing_node(id))?;
                numeric_attribute(node, &self.attribute)
            })
            .collect()
    }
}

/// A concrete predictor built from a descriptor.
#[derive(Debug)]
pub enum Predictor {
    Topology(TopologyPredictor),
    SocialTheory(SocialTheoryPredictor),
    Classifier(ClassifierModel),
    Attribute(AttributePredictor),
}

impl Predictor {
    pub fn designation(&self) -> &'static str {
        match self {
            Predictor::Topology(p) => p.designation(),
            Predictor::SocialTheory(p) => p.designation(),
            Predictor::Classifier(p) => p.designation(),
            Predictor::Attribute(p) => p.designation(),
        }
    }
}

/// Builds predictors for one run.
#[derive(Debug, Clone, Default)]
pub struct PredictorFactory {
    /// Seed of randomised classifiers.
    pub seed: u64,
    /// Let topology predictors score pairs in parallel.
    pub parallel: bool,
}

fn unknown_designation(descriptor: &PredictorDescriptor) -> PredictError {
    PredictError::InvalidParameter(format!(
        "invalid designation '{}' for feature type '{}'",
        descriptor.designation, descriptor.feature_type
    ))
}

impl PredictorFactory {
    pub fn new(seed: u64) -> Self {
        Self { seed, parallel: false }
    }

    pub fn create(&self, descriptor: &PredictorDescriptor) -> Result<Predictor, PredictError> {
        match descriptor.feature_type {
            FeatureType::Topology => self.topology(descriptor).map(Predictor::Topology),
            FeatureType::EndogenousSocialTheory => {
                endogenous(descriptor).map(Predictor::SocialTheory)
            }
            FeatureType::ExogenousSocialTheory => {
                exogenous(descriptor).map(Predictor::SocialTheory)
            }
            FeatureType::Classifier => self.classifier(descriptor).map(Predictor::Classifier),
            FeatureType::Others => others(descriptor).map(Predictor::Attribute),
        }
    }

    fn topology(&self, descriptor: &PredictorDescriptor) -> Result<TopologyPredictor, PredictError> {
        let index: TopologyIndex = descriptor
            .designation
            .parse()
            .map_err(|_| unknown_designation(descriptor))?;
        let params = &descriptor.parameters;
        let mut predictor = TopologyPredictor::new(index);
        if let Some(method) = params.text("method")? {
            predictor.method = method.parse::<PathMethod>()?;
        }
        predictor.iterations = params.count_or("iterations", 1)?;
        if predictor.iterations < 1 {
            return Err(PredictError::InvalidParameter(
                "same community iterations must be at least 1".into(),
            ));
        }
        predictor.parallel = self.parallel;
        Ok(predictor)
    }

    fn classifier(&self, descriptor: &PredictorDescriptor) -> Result<ClassifierModel, PredictError> {
        let kind: ClassifierKind = descriptor
            .designation
            .parse()
            .map_err(|_| unknown_designation(descriptor))?;
        let params = &descriptor.parameters;
        let defaults = ClassifierSettings::default();
        let settings = ClassifierSettings {
            k: params.count_or("k", defaults.k)?,
            n_estimators: params.count_or("n_estimators", defaults.n_estimators)?,
            max_depth: params
                .number("max_depth")?
                .map(|_| params.count_or("max_depth", 0))
                .transpose()?,
            learning_rate: params.number_or("learning_rate", defaults.learning_rate)?,
            seed: self.seed,
        };
        ClassifierModel::new(kind, settings)
    }
}

fn collective_action_params(params: &PredictorParameters) -> Result<CollectiveActionParams, PredictError> {
    let defaults = CollectiveActionParams::default();
    Ok(CollectiveActionParams {
        max_distance: params.count_or("max_distance", defaults.max_distance)?,
        percentile_centrality: params.percentile_or("percentile_centrality", defaults.percentile_centrality)?,
        percentile_distant_nodes: params
            .percentile_or("percentile_distant_nodes", defaults.percentile_distant_nodes)?,
        katz_alpha: params.number_or("katz_alpha", KATZ_ALPHA)?,
    })
}

fn endogenous(descriptor: &PredictorDescriptor) -> Result<SocialTheoryPredictor, PredictError> {
    let params = &descriptor.parameters;
    Ok(match descriptor.designation.as_str() {
        "SocialExchangeTheory" => SocialTheoryPredictor::SocialExchange,
        "BalanceTheory" => SocialTheoryPredictor::Balance { exogenous: None },
        "CollectiveActionTheory" => SocialTheoryPredictor::CollectiveAction {
            params: collective_action_params(params)?,
            exogenous: None,
        },
        "StructuralHoleTheory" => SocialTheoryPredictor::StructuralHole {
            percentile_constraints: params.percentile_or("percentile_constraints", 10.0)?,
        },
        _ => return Err(unknown_designation(descriptor)),
    })
}

fn exogenous(descriptor: &PredictorDescriptor) -> Result<SocialTheoryPredictor, PredictError> {
    let params = &descriptor.parameters;
    let attributes = ExogenousParams {
        weightings: params.weightings()?,
        threshold: params.number("threshold")?,
    };
    Ok(match descriptor.designation.as_str() {
        "HomophilyTheories" => SocialTheoryPredictor::Homophily(attributes),
        "BalanceTheory" => SocialTheoryPredictor::Balance {
            exogenous: Some(attributes),
        },
        "ResourceDependenceTheory" => SocialTheoryPredictor::ResourceDependence(attributes),
        "CollectiveActionTheory" => SocialTheoryPredictor::CollectiveAction {
            params: collective_action_params(params)?,
            exogenous: Some(attributes),
        },
        _ => return Err(unknown_designation(descriptor)),
    })
}

fn others(descriptor: &PredictorDescriptor) -> Result<AttributePredictor, PredictError> {
    let endpoint = match descriptor.designation.as_str() {
        "UAttribute" => Endpoint::U,
        "VAttribute" => Endpoint::V,
        _ => return Err(unknown_designation(descriptor)),
    };
    let attribute = descriptor.parameters.text("attribute")?.ok_or_else(|| {
        PredictError::InvalidParameter(format!("{} requires an 'attribute' parameter", descriptor.designation))
    })?;
    Ok(AttributePredictor {
        endpoint,
        attribute: attribute.to_string(),
    })
}
