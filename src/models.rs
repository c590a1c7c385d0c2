//! Modelos de dominio: técnicos, tickets, empleados y datos operativos de agua.

use std::fmt;

use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------
// TÉCNICOS
// ---------------------------------------------------------------------

/// Disponibilidad de un técnico. Cualquier valor desconocido en los datos se
/// trata como no disponible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TechnicianStatus {
    Available,
    Unavailable,
}

impl From<String> for TechnicianStatus {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("available") {
            Self::Available
        } else {
            Self::Unavailable
        }
    }
}

impl From<TechnicianStatus> for String {
    fn from(s: TechnicianStatus) -> Self {
        match s {
            TechnicianStatus::Available => "Available".to_string(),
            TechnicianStatus::Unavailable => "Unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technician {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub zone: String,
    pub status: TechnicianStatus,
    #[serde(default)]
    pub current_workload: u32,
    #[serde(default = "default_capacity")]
    pub max_capacity: u32,
}

fn default_capacity() -> u32 {
    1
}

impl Technician {
    pub fn is_available(&self) -> bool {
        self.status == TechnicianStatus::Available
    }

    /// Carga relativa (workload / capacidad). La capacidad 0 se trata como 1.
    pub fn load_ratio(&self) -> f64 {
        f64::from(self.current_workload) / f64::from(self.max_capacity.max(1))
    }
}

// ---------------------------------------------------------------------
// TICKETS
// ---------------------------------------------------------------------

/// Se deserializa sin distinguir mayúsculas (`"high"`, `"HIGH"`, `"High"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| de::Error::unknown_variant(&raw, &["Critical", "High", "Medium", "Low"]))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "new" => Some(Self::New),
            "in progress" | "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Aplica una acción del usuario. Devuelve `None` si la transición no es válida.
    pub fn apply(self, action: TicketAction) -> Option<Self> {
        use TicketStatus::*;
        match (action, self) {
            (TicketAction::Start, New) => Some(InProgress),
            (TicketAction::Resolve, New | InProgress) => Some(Resolved),
            (TicketAction::Reopen, InProgress | Resolved | Closed) => Some(New),
            _ => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "New",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketAction {
    Start,
    Resolve,
    Reopen,
}

/// Resultado de clasificar la descripción de una incidencia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub priority: Priority,
    pub confidence: f64,
    pub reasoning: String,
    /// Estrategia que produjo la respuesta (`gemini`, `openai`, `anthropic`, `fallback`).
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub description: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_contact: String,
    #[serde(default)]
    pub area: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub category: String,
    #[serde(default = "unassigned")]
    pub assigned_tech: String,
    #[serde(default)]
    pub created_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_solution: Option<String>,
}

pub const UNASSIGNED: &str = "Unassigned";

fn unassigned() -> String {
    UNASSIGNED.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sla_hours: Option<u32>,
}

// ---------------------------------------------------------------------
// RRHH
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveBalance {
    #[serde(default)]
    pub vacation: u32,
    #[serde(default)]
    pub sick: u32,
    #[serde(default)]
    pub emergency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub leave_balance: LeaveBalance,
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub hire_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

// ---------------------------------------------------------------------
// DATOS OPERATIVOS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceArea {
    pub area: String,
    pub population: u64,
    pub service_connections: u64,
    pub monthly_consumption_liters: f64,
    pub water_quality_score: f64,
    pub service_availability: f64,
    pub customer_satisfaction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyTrend {
    pub month: String,
    pub consumption: f64,
    pub complaints: f64,
    pub new_connections: u64,
    pub quality_score: f64,
}

// ---------------------------------------------------------------------
// CHAT
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    ConsumptionBar,
    QualityBar,
    TrendsLine,
    Scatter,
}

/// Descriptor de gráfico: tipo, título y el conjunto de datos que lo alimenta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), chart: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), chart: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_status_transitions() {
        assert_eq!(TicketStatus::New.apply(TicketAction::Start), Some(TicketStatus::InProgress));
        assert_eq!(TicketStatus::InProgress.apply(TicketAction::Resolve), Some(TicketStatus::Resolved));
        assert_eq!(TicketStatus::Resolved.apply(TicketAction::Reopen), Some(TicketStatus::New));
        assert_eq!(TicketStatus::Resolved.apply(TicketAction::Start), None);
        assert_eq!(TicketStatus::New.apply(TicketAction::Reopen), None);
    }

    #[test]
    fn unknown_technician_status_is_unavailable() {
        let t: Technician = serde_json::from_value(serde_json::json!({
            "name": "Ana", "status": "On Leave", "max_capacity": 4
        }))
        .unwrap();
        assert!(!t.is_available());

        let t: Technician = serde_json::from_value(serde_json::json!({
            "name": "Ben", "status": "available"
        }))
        .unwrap();
        assert!(t.is_available());
        assert_eq!(t.max_capacity, 1);
    }

    #[test]
    fn in_progress_uses_spaced_wire_name() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
        assert_eq!(Priority::parse(" HIGH "), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), None);
        let p: Priority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(p, Priority::Critical);
        assert!(serde_json::from_str::<Priority>("\"urgent\"").is_err());
    }
}
