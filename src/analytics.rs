//! Agregados numéricos sobre los datos operativos y de RRHH.
//!
//! Funciones puras: máximos, medias y variación porcentual entre periodos.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::models::{Employee, MonthlyTrend, ServiceArea};

const BILLION: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_population_served: u64,
    pub total_service_connections: u64,
    pub average_water_quality: f64,
    pub monthly_consumption_billion_liters: f64,
    pub treatment_plants: u64,
    pub pipeline_network_km: f64,
    pub customer_satisfaction: f64,
    pub average_response_time: f64,
}

/// Variación entre los dos últimos periodos de la serie mensual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendDelta {
    pub latest_month: String,
    /// `None` cuando la serie sólo tiene un periodo.
    pub previous_month: Option<String>,
    pub consumption_change_pct: Option<f64>,
    pub complaints_change_pct: Option<f64>,
    pub latest_complaints: f64,
    pub previous_complaints: Option<f64>,
    pub new_connections: u64,
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn total_consumption_billion(areas: &[ServiceArea]) -> f64 {
    areas.iter().map(|a| a.monthly_consumption_liters).sum::<f64>() / BILLION
}

pub fn to_billions(liters: f64) -> f64 {
    liters / BILLION
}

pub fn average_quality(areas: &[ServiceArea]) -> f64 {
    if areas.is_empty() {
        return 0.0;
    }
    areas.iter().map(|a| a.water_quality_score).sum::<f64>() / areas.len() as f64
}

/// Máximo por clave; ante empate gana el primero.
pub fn highest_by<T, F>(items: &[T], key: F) -> Option<&T>
where
    F: Fn(&T) -> f64,
{
    items.iter().fold(None, |best: Option<&T>, item| match best {
        Some(b) if key(b) >= key(item) => Some(b),
        _ => Some(item),
    })
}

/// `(curr - prev) / prev * 100`. Sin base de comparación (`prev == 0`) no hay
/// variación definida.
pub fn percent_change(prev: f64, curr: f64) -> Option<f64> {
    if prev == 0.0 || !prev.is_finite() || !curr.is_finite() {
        return None;
    }
    Some((curr - prev) / prev * 100.0)
}

pub fn summary_stats(areas: &[ServiceArea], metrics: &Value) -> SummaryStats {
    let num = |key: &str| metrics.get(key).and_then(Value::as_f64).unwrap_or(0.0);

    SummaryStats {
        total_population_served: areas.iter().map(|a| a.population).sum(),
        total_service_connections: areas.iter().map(|a| a.service_connections).sum(),
        average_water_quality: round1(average_quality(areas)),
        monthly_consumption_billion_liters: round1(total_consumption_billion(areas)),
        treatment_plants: metrics
            .get("total_treatment_plants")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        pipeline_network_km: num("total_pipeline_km"),
        customer_satisfaction: num("customer_satisfaction_score"),
        average_response_time: num("average_response_time_hours"),
    }
}

pub fn recent_trend(trends: &[MonthlyTrend]) -> Option<TrendDelta> {
    let latest = trends.last()?;
    let previous = trends.len().checked_sub(2).map(|i| &trends[i]);

    Some(TrendDelta {
        latest_month: latest.month.clone(),
        previous_month: previous.map(|p| p.month.clone()),
        consumption_change_pct: previous.and_then(|p| percent_change(p.consumption, latest.consumption)),
        complaints_change_pct: previous.and_then(|p| percent_change(p.complaints, latest.complaints)),
        latest_complaints: latest.complaints,
        previous_complaints: previous.map(|p| p.complaints),
        new_connections: latest.new_connections,
    })
}

/// Las `limit` áreas con más consumo, de mayor a menor.
pub fn top_by_consumption(areas: &[ServiceArea], limit: usize) -> Vec<ServiceArea> {
    let mut sorted = areas.to_vec();
    sorted.sort_by(|a, b| b.monthly_consumption_liters.total_cmp(&a.monthly_consumption_liters));
    sorted.truncate(limit);
    sorted
}

pub fn top_by_quality(areas: &[ServiceArea], limit: usize) -> Vec<ServiceArea> {
    let mut sorted = areas.to_vec();
    sorted.sort_by(|a, b| b.water_quality_score.total_cmp(&a.water_quality_score));
    sorted.truncate(limit);
    sorted
}

pub fn department_distribution(employees: &[Employee]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for emp in employees {
        let dept = if emp.department.is_empty() { "Unknown" } else { emp.department.as_str() };
        *counts.entry(dept.to_string()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageLeave {
    pub vacation: f64,
    pub sick: f64,
    pub emergency: f64,
}

pub fn average_leave_balance(employees: &[Employee]) -> AverageLeave {
    if employees.is_empty() {
        return AverageLeave { vacation: 0.0, sick: 0.0, emergency: 0.0 };
    }
    AverageLeave {
        vacation: mean_of(employees, |e| e.leave_balance.vacation),
        sick: mean_of(employees, |e| e.leave_balance.sick),
        emergency: mean_of(employees, |e| e.leave_balance.emergency),
    }
}

fn mean_of(employees: &[Employee], field: impl Fn(&Employee) -> u32) -> f64 {
    let total: f64 = employees.iter().map(|e| f64::from(field(e))).sum();
    round1(total / employees.len() as f64)
}
