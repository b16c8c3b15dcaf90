//! Risk scoring
//!
//! Turns the factors extracted by [`crate::analysis`] into a numeric score and
//! a discrete [`RiskLevel`].

pub mod scorer;

pub use scorer::{FactorScores, RiskAssessment, RiskFactor, RiskLevel, RiskScorer, RiskWeights};
