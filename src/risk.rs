use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{EmbeddingPoint, PatientRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub total: usize,
    pub at_risk: usize,
    pub share: f64,
}

/// Patients sharing one embedding color value, with how many of them carry
/// the risk label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRisk {
    pub color_value: f64,
    pub points: usize,
    pub at_risk: usize,
}

/// Accepts `0`/`1` (including `1.0`), `true`/`false` and `yes`/`no`.
pub fn parse_risk_label(raw: &str) -> Option<bool> {
    let value = raw.trim();
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => return Some(true),
        "false" | "no" => return Some(false),
        _ => {}
    }

    match value.parse::<f64>() {
        Ok(number) if number == 1.0 => Some(true),
        Ok(number) if number == 0.0 => Some(false),
        _ => None,
    }
}

pub fn summarize(patients: &[PatientRecord]) -> RiskSummary {
    let total = patients.len();
    let at_risk = patients.iter().filter(|patient| patient.risk).count();
    RiskSummary {
        total,
        at_risk,
        share: if total == 0 {
            0.0
        } else {
            at_risk as f64 / total as f64
        },
    }
}

/// Points are joined to patients by position, never by uid.
pub fn cluster_agreement(
    patients: &[PatientRecord],
    embedding: &[EmbeddingPoint],
) -> Vec<ClusterRisk> {
    let mut points: Vec<&EmbeddingPoint> = embedding.iter().collect();
    points.sort_by(|a, b| a.color_value.total_cmp(&b.color_value));

    let mut clusters: Vec<ClusterRisk> = Vec::new();
    for point in points {
        let at_risk = patients
            .get(point.index)
            .map_or(0, |patient| usize::from(patient.risk));

        match clusters.last_mut() {
            Some(cluster) if cluster.color_value.total_cmp(&point.color_value) == Ordering::Equal => {
                cluster.points += 1;
                cluster.at_risk += at_risk;
            }
            _ => clusters.push(ClusterRisk {
                color_value: point.color_value,
                points: 1,
                at_risk,
            }),
        }
    }

    clusters
}
