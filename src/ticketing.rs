//! Alta y ciclo de vida de tickets de cliente.

use std::collections::BTreeMap;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    analytics,
    config::ProviderKeys,
    dataset::Dataset,
    error::{AppError, Result},
    fallback,
    llm::LlmManager,
    models::{Classification, Priority, Technician, Ticket, TicketAction, TicketStatus, UNASSIGNED},
    routing::{find_best_technician, MatchPolicy},
    session::Session,
};

/// Datos del formulario de alta.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewTicket {
    pub description: String,
    pub customer_name: String,
    pub customer_contact: String,
    pub area: String,
    /// Categoría elegida por el usuario; tiene prioridad sobre la de la IA.
    pub category: Option<String>,
    /// Prioridad elegida por el usuario; tiene prioridad sobre la de la IA.
    pub priority: Option<String>,
}

fn required(value: &str, field: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::BadRequest(format!("El campo '{field}' es obligatorio.")));
    }
    Ok(v.to_string())
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Clasifica, asigna técnico y sugiere solución. El ticket devuelto aún no
/// tiene id: se le asigna al archivarlo en la sesión con [`file_ticket`].
pub async fn create_ticket(
    dataset: &Dataset,
    llm: &LlmManager,
    policy: MatchPolicy,
    keys: &ProviderKeys,
    input: NewTicket,
) -> Result<Ticket> {
    let description = required(&input.description, "description")?;
    let customer_name = required(&input.customer_name, "customer_name")?;
    let area = required(&input.area, "area")?;

    let categories = dataset.category_names();

    let category_override = match input.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(wanted) => Some(
            fallback::resolve_category(wanted, &categories)
                .map(str::to_string)
                .ok_or_else(|| AppError::BadRequest(format!("Categoría desconocida: {wanted}")))?,
        ),
        None => None,
    };
    let priority_override = match input.priority.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(wanted) => Some(
            Priority::parse(wanted).ok_or_else(|| AppError::BadRequest(format!("Prioridad desconocida: {wanted}")))?,
        ),
        None => None,
    };

    let classification = llm.classify_ticket(&description, &categories, keys).await;

    let category = category_override.unwrap_or_else(|| classification.category.clone());
    let priority = priority_override.unwrap_or(classification.priority);

    let assigned_tech = find_best_technician(dataset.technicians(), &category, Some(&area), policy)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| UNASSIGNED.to_string());

    let solution = llm.suggest_solution(&category, &description, keys).await;

    Ok(Ticket {
        id: String::new(),
        description,
        customer_name,
        customer_contact: input.customer_contact.trim().to_string(),
        area,
        status: TicketStatus::New,
        priority,
        category,
        assigned_tech,
        created_date: now_stamp(),
        ai_classification: Some(classification),
        suggested_solution: Some(solution.value),
    })
}

/// Asigna el siguiente id de la sesión y añade el ticket.
pub fn file_ticket(session: &mut Session, mut ticket: Ticket) -> Ticket {
    ticket.id = session.allocate_ticket_id();
    info!("🎫 Ticket {} creado ({}, {}) → {}", ticket.id, ticket.category, ticket.priority, ticket.assigned_tech);
    session.tickets.push(ticket.clone());
    ticket
}

pub fn update_status(session: &mut Session, ticket_id: &str, action: TicketAction) -> Result<Ticket> {
    let ticket = session
        .ticket_mut(ticket_id)
        .ok_or_else(|| AppError::NotFound(format!("Ticket no encontrado: {ticket_id}")))?;

    let next = ticket.status.apply(action).ok_or_else(|| {
        AppError::Conflict(format!("Transición no válida para {}: {:?} desde '{}'", ticket.id, action, ticket.status))
    })?;
    ticket.status = next;
    Ok(ticket.clone())
}

// ---------------------------------------------------------------------
// CONSULTAS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
}

pub fn list(tickets: &[Ticket], filter: &TicketFilter) -> Result<Vec<Ticket>> {
    let status = match filter.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => Some(TicketStatus::parse(s).ok_or_else(|| AppError::BadRequest(format!("Estado desconocido: {s}")))?),
        None => None,
    };
    let priority = match filter.priority.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(p) => Some(Priority::parse(p).ok_or_else(|| AppError::BadRequest(format!("Prioridad desconocida: {p}")))?),
        None => None,
    };

    Ok(tickets
        .iter()
        .filter(|t| status.map_or(true, |s| t.status == s))
        .filter(|t| priority.map_or(true, |p| t.priority == p))
        .cloned()
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicketStats {
    pub total: usize,
    pub open: usize,
    pub critical_open: usize,
    pub unassigned: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_area: BTreeMap<String, usize>,
}

pub fn stats(tickets: &[Ticket]) -> TicketStats {
    let mut out = TicketStats { total: tickets.len(), ..Default::default() };
    for t in tickets {
        let open = matches!(t.status, TicketStatus::New | TicketStatus::InProgress);
        if open {
            out.open += 1;
            if t.priority == Priority::Critical {
                out.critical_open += 1;
            }
        }
        if t.assigned_tech == UNASSIGNED {
            out.unassigned += 1;
        }
        *out.by_status.entry(t.status.to_string()).or_default() += 1;
        *out.by_priority.entry(t.priority.to_string()).or_default() += 1;
        *out.by_category.entry(t.category.clone()).or_default() += 1;
        let area = if t.area.trim().is_empty() { "Unknown" } else { t.area.trim() };
        *out.by_area.entry(area.to_string()).or_default() += 1;
    }
    out
}

/// Técnico con su ocupación en porcentaje (`current_workload / max_capacity`).
#[derive(Debug, Clone, Serialize)]
pub struct TechnicianLoad<'a> {
    #[serde(flatten)]
    pub technician: &'a Technician,
    pub workload_pct: f64,
}

pub fn technician_workload<'a>(technicians: impl IntoIterator<Item = &'a Technician>) -> Vec<TechnicianLoad<'a>> {
    technicians
        .into_iter()
        .map(|technician| TechnicianLoad { technician, workload_pct: analytics::round1(technician.load_ratio() * 100.0) })
        .collect()
}

/// Resultado de la demo de clasificación (no se guarda nada).
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyDemo {
    pub classification: Classification,
    pub technician: Option<Technician>,
    pub suggested_solution: String,
    pub solution_source: String,
}

pub async fn classify_demo(
    dataset: &Dataset,
    llm: &LlmManager,
    policy: MatchPolicy,
    keys: &ProviderKeys,
    description: &str,
) -> Result<ClassifyDemo> {
    let description = required(description, "description")?;
    let classification = llm.classify_ticket(&description, &dataset.category_names(), keys).await;
    let technician = find_best_technician(dataset.technicians(), &classification.category, None, policy).cloned();
    let solution = llm.suggest_solution(&classification.category, &description, keys).await;

    Ok(ClassifyDemo {
        classification,
        technician,
        suggested_solution: solution.value,
        solution_source: solution.source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::fixture,
        llm::testing::{config_with_keys, ScriptedBackend},
    };
    use std::sync::Arc;

    fn offline_llm() -> LlmManager {
        LlmManager::with_backend(&config_with_keys(ProviderKeys::default()), Arc::new(ScriptedBackend::default()))
    }

    fn input(description: &str, area: &str) -> NewTicket {
        NewTicket {
            description: description.to_string(),
            customer_name: "Liza Soberano".to_string(),
            customer_contact: "liza@example.com".to_string(),
            area: area.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn main_break_in_makati_goes_to_miguel() {
        let ds = fixture();
        let llm = offline_llm();
        let ticket = create_ticket(
            &ds,
            &llm,
            MatchPolicy::LeastLoaded,
            &ProviderKeys::default(),
            input("Major water main break on Ayala Avenue causing street flooding", "Makati"),
        )
        .await
        .unwrap();

        assert_eq!(ticket.priority, Priority::Critical);
        assert_eq!(ticket.category, "Emergency Repairs");
        assert_eq!(ticket.assigned_tech, "Miguel Torres");
        assert_eq!(ticket.status, TicketStatus::New);
        assert!(ticket.suggested_solution.as_deref().unwrap_or("").contains("Immediate Steps"));
        assert_eq!(ticket.ai_classification.as_ref().map(|c| c.source.as_str()), Some(fallback::FALLBACK_SOURCE));
    }

    #[tokio::test]
    async fn user_choices_override_classification() {
        let ds = fixture();
        let llm = offline_llm();
        let mut form = input("My water bill doubled", "Pasig");
        form.category = Some("service interruption".into());
        form.priority = Some("critical".into());

        let ticket = create_ticket(&ds, &llm, MatchPolicy::FirstMatch, &ProviderKeys::default(), form)
            .await
            .unwrap();
        assert_eq!(ticket.category, "Service Interruption");
        assert_eq!(ticket.priority, Priority::Critical);
        assert_eq!(ticket.assigned_tech, "Luis Garcia");
        assert_eq!(ticket.ai_classification.as_ref().map(|c| c.category.as_str()), Some("Billing Inquiries"));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let ds = fixture();
        let llm = offline_llm();
        for form in [input("  ", "Makati"), input("Leak", ""), NewTicket { customer_name: String::new(), ..input("Leak", "Makati") }] {
            let err = create_ticket(&ds, &llm, MatchPolicy::LeastLoaded, &ProviderKeys::default(), form)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }

        let mut form = input("Leak", "Makati");
        form.category = Some("Alien Activity".into());
        let err = create_ticket(&ds, &llm, MatchPolicy::LeastLoaded, &ProviderKeys::default(), form)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn filed_tickets_get_unique_ids() {
        let ds = fixture();
        let llm = offline_llm();
        let mut session = Session::seeded(&ds);

        let a = create_ticket(&ds, &llm, MatchPolicy::LeastLoaded, &ProviderKeys::default(), input("No water supply", "Manila"))
            .await
            .unwrap();
        let b = a.clone();
        let a = file_ticket(&mut session, a);
        let b = file_ticket(&mut session, b);
        assert_eq!(a.id, "TKT006");
        assert_eq!(b.id, "TKT007");
        assert_eq!(session.tickets.len(), 7);
    }

    #[test]
    fn status_transitions_and_errors() {
        let ds = fixture();
        let mut session = Session::seeded(&ds);

        let t = update_status(&mut session, "TKT001", TicketAction::Start).unwrap();
        assert_eq!(t.status, TicketStatus::InProgress);
        let t = update_status(&mut session, "TKT001", TicketAction::Resolve).unwrap();
        assert_eq!(t.status, TicketStatus::Resolved);

        let err = update_status(&mut session, "TKT001", TicketAction::Start).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = update_status(&mut session, "TKT999", TicketAction::Start).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let t = update_status(&mut session, "TKT001", TicketAction::Reopen).unwrap();
        assert_eq!(t.status, TicketStatus::New);
    }

    #[test]
    fn list_filters_and_stats() {
        let ds = fixture();
        let tickets = ds.sample_tickets();

        let open_high = list(tickets, &TicketFilter { status: Some("new".into()), priority: Some("High".into()) }).unwrap();
        assert_eq!(open_high.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["TKT001"]);
        assert_eq!(list(tickets, &TicketFilter::default()).unwrap().len(), tickets.len());
        assert!(list(tickets, &TicketFilter { status: Some("lost".into()), priority: None }).is_err());

        let s = stats(tickets);
        assert_eq!(s.total, 5);
        assert_eq!(s.open, 4);
        assert_eq!(s.unassigned, 1);
        assert_eq!(s.by_status.get("In Progress"), Some(&1));
        assert_eq!(s.by_priority.get("High"), Some(&2));
        assert_eq!(s.by_area.len(), 5);
        assert_eq!(s.by_area.get("Makati"), Some(&1));
        assert_eq!(s.by_area.get("Quezon City"), Some(&1));
    }

    #[test]
    fn workload_is_a_percentage_of_capacity() {
        let ds = fixture();
        let loads = technician_workload(ds.technicians());
        assert_eq!(loads.len(), 6);
        assert_eq!(loads[0].technician.name, "Miguel Torres");
        assert_eq!(loads[0].workload_pct, 50.0);
        assert_eq!(loads[2].workload_pct, 16.7);
        assert_eq!(loads[4].workload_pct, 100.0);

        let json = serde_json::to_value(&loads[1]).unwrap();
        assert_eq!(json["specialty"], "Water Quality Issues");
        assert_eq!(json["status"], "Available");
        assert_eq!(json["workload_pct"], 40.0);
    }

    #[test]
    fn classify_demo_stores_nothing() {
        let ds = fixture();
        let llm = offline_llm();
        let demo = tokio_test::block_on(classify_demo(
            &ds,
            &llm,
            MatchPolicy::LeastLoaded,
            &ProviderKeys::default(),
            "Water coming out of tap has strange smell and taste",
        ))
        .unwrap();
        assert_eq!(demo.classification.category, "Water Quality Issues");
        assert_eq!(demo.technician.map(|t| t.name), Some("Patricia Reyes".to_string()));
        assert_eq!(demo.solution_source, fallback::FALLBACK_SOURCE);
        assert_eq!(ds.sample_tickets().len(), 5);
    }
}
