//! Selección de contexto para las llamadas al LLM.
//!
//! A partir de la pregunta del usuario se decide qué subconjuntos de los datos
//! estáticos se adjuntan al prompt, y si además conviene un gráfico.

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    analytics::SummaryStats,
    dataset::Dataset,
    models::{ChartKind, ChartSpec, Employee, MonthlyTrend, ServiceArea},
    rules::{KeywordRule, RuleSet},
};

// ---------------------------------------------------------------------
// CONTEXTO DE DATOS OPERATIVOS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSection {
    ServiceAreas,
    WaterQuality,
    MonthlyTrends,
    Infrastructure,
    OperationalMetrics,
}

pub const DATA_CONTEXT_RULES: RuleSet<DataSection> = RuleSet::new(&[
    KeywordRule { name: "areas", keywords: &["area", "consumption", "usage", "demand"], action: DataSection::ServiceAreas },
    KeywordRule { name: "quality", keywords: &["quality", "standard", "parameters", "compliance"], action: DataSection::WaterQuality },
    KeywordRule { name: "trends", keywords: &["trend", "monthly", "time", "growth"], action: DataSection::MonthlyTrends },
    KeywordRule { name: "infrastructure", keywords: &["infrastructure", "plant", "pipeline", "facility"], action: DataSection::Infrastructure },
    KeywordRule { name: "metrics", keywords: &["metric", "performance", "operational", "efficiency"], action: DataSection::OperationalMetrics },
]);

/// Contexto adjunto a una consulta sobre datos. `summary_stats` siempre está.
#[derive(Debug, Clone, Serialize)]
pub struct DataContext {
    pub summary_stats: SummaryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_areas: Option<Vec<ServiceArea>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_quality: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_trends: Option<Vec<MonthlyTrend>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operational_metrics: Option<Value>,
}

impl DataContext {
    /// Nombres de las secciones adjuntas, en orden de serialización.
    pub fn sections(&self) -> Vec<&'static str> {
        let mut out = vec!["summary_stats"];
        if self.service_areas.is_some() {
            out.push("service_areas");
        }
        if self.water_quality.is_some() {
            out.push("water_quality");
        }
        if self.monthly_trends.is_some() {
            out.push("monthly_trends");
        }
        if self.infrastructure.is_some() {
            out.push("infrastructure");
        }
        if self.operational_metrics.is_some() {
            out.push("operational_metrics");
        }
        out
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub fn assemble_data_context(query: &str, dataset: &Dataset) -> DataContext {
    let mut ctx = DataContext {
        summary_stats: dataset.summary_stats(),
        service_areas: None,
        water_quality: None,
        monthly_trends: None,
        infrastructure: None,
        operational_metrics: None,
    };

    for rule in DATA_CONTEXT_RULES.all_matches(query) {
        match rule.action {
            DataSection::ServiceAreas => {
                ctx.service_areas = Some(dataset.service_areas().to_vec());
            }
            DataSection::WaterQuality => {
                ctx.water_quality = Some(dataset.water_quality_parameters().clone());
                ctx.service_areas = Some(dataset.service_areas().to_vec());
            }
            DataSection::MonthlyTrends => {
                ctx.monthly_trends = Some(dataset.monthly_trends().to_vec());
            }
            DataSection::Infrastructure => {
                ctx.infrastructure = Some(dataset.infrastructure_status().clone());
            }
            DataSection::OperationalMetrics => {
                ctx.operational_metrics = Some(dataset.operational_metrics().clone());
            }
        }
    }
    ctx
}

// ---------------------------------------------------------------------
// GRÁFICOS
// ---------------------------------------------------------------------

pub const CHART_TRIGGER_RULES: RuleSet<()> = RuleSet::new(&[KeywordRule {
    name: "chart-worthy",
    keywords: &[
        "show", "chart", "graph", "plot", "visualize", "compare", "trend", "breakdown", "distribution",
        "analysis",
    ],
    action: (),
}]);

pub const CHART_RULES: RuleSet<ChartKind> = RuleSet::new(&[
    KeywordRule { name: "consumption", keywords: &["consumption", "usage", "demand", "area"], action: ChartKind::ConsumptionBar },
    KeywordRule { name: "quality", keywords: &["quality", "compliance", "standard"], action: ChartKind::QualityBar },
    KeywordRule { name: "trends", keywords: &["trend", "monthly", "time"], action: ChartKind::TrendsLine },
    KeywordRule { name: "population", keywords: &["population", "demographic", "correlation"], action: ChartKind::Scatter },
]);

pub fn wants_chart(query: &str) -> bool {
    CHART_TRIGGER_RULES.any_match(query)
}

/// Descriptor de gráfico para la consulta, o `None` si no procede.
pub fn select_chart(query: &str, dataset: &Dataset) -> Option<ChartSpec> {
    if !wants_chart(query) {
        return None;
    }
    let kind = CHART_RULES.first_match(query)?.action;
    let (title, data) = match kind {
        ChartKind::ConsumptionBar => ("Water Consumption by Service Area", json!(dataset.service_areas())),
        ChartKind::QualityBar => ("Water Quality Scores by Area", json!(dataset.service_areas())),
        ChartKind::TrendsLine => ("Monthly Performance Trends", json!(dataset.monthly_trends())),
        ChartKind::Scatter => ("Population vs Water Consumption", json!(dataset.service_areas())),
    };
    Some(ChartSpec { kind, title: title.to_string(), data })
}

// ---------------------------------------------------------------------
// CONTEXTO DE RRHH
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrSection {
    LeavePolicies,
    HrPolicies,
    OnboardingFaq,
    Training,
}

pub const HR_CONTEXT_RULES: RuleSet<HrSection> = RuleSet::new(&[
    KeywordRule { name: "leave", keywords: &["leave", "vacation", "sick", "time off"], action: HrSection::LeavePolicies },
    KeywordRule { name: "policies", keywords: &["policy", "benefit", "insurance", "health"], action: HrSection::HrPolicies },
    KeywordRule { name: "onboarding", keywords: &["onboard", "new employee", "first day", "start"], action: HrSection::OnboardingFaq },
    KeywordRule { name: "training", keywords: &["training", "development", "course", "learning"], action: HrSection::Training },
]);

pub fn assemble_hr_context(query: &str, dataset: &Dataset) -> String {
    let mut context = String::new();
    for rule in HR_CONTEXT_RULES.all_matches(query) {
        let (label, value) = match rule.action {
            HrSection::LeavePolicies => ("Leave Policies", dataset.leave_policies().clone()),
            HrSection::HrPolicies => ("HR Policies", json!(dataset.hr_policies())),
            HrSection::OnboardingFaq => ("Onboarding FAQ", json!(dataset.onboarding_faq())),
            HrSection::Training => (
                "Training Information",
                dataset.policy_by_name("training_programs").cloned().unwrap_or(Value::Null),
            ),
        };
        context.push_str(&format!("\n{label}: {value}"));
    }
    context
}

pub fn employee_context(employee: Option<&Employee>) -> String {
    match employee {
        Some(e) => format!(
            "Current Employee: {}\nDepartment: {}\nPosition: {}\nLeave Balance: vacation {}, sick {}, emergency {}",
            e.name,
            e.department,
            e.position,
            e.leave_balance.vacation,
            e.leave_balance.sick,
            e.leave_balance.emergency
        ),
        None => String::new(),
    }
}
