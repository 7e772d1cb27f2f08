//! The prediction engine.
//!
//! This module provides:
//! - **errors**: Error type shared by every stage
//! - **graph**: Hierarchical (pair-keyed) and flat directed graphs with prediction provenance
//! - **adjacency**, **centrality**, **community**, **triads**: graph algorithms over compact indices
//! - **similarity**: Topology indices scoring candidate pairs
//! - **social_theory**: Endogenous and exogenous social-theory edge proposals
//! - **attributes**: Attribute similarity backed by occupation lookups
//! - **sampling**, **dataset**: Train/test graphs and labelled candidate pairs
//! - **classification**: Binary classifiers trained on feature columns
//! - **factory**: Predictor descriptors and their construction
//! - **monitor**, **worker**: Progress reporting and the prediction pipeline

pub mod adjacency;
pub mod attributes;
pub mod centrality;
pub mod classification;
pub mod community;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod factory;
pub mod graph;
pub mod monitor;
pub mod sampling;
pub mod similarity;
pub mod social_theory;
pub mod triads;
pub mod worker;
