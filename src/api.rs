use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    analytics,
    app_state::AppState,
    config::ProviderKeys,
    context::{assemble_data_context, assemble_hr_context, employee_context, select_chart},
    error::{AppError, AppJson, Result},
    models::{ChartSpec, ChatMessage, Employee, ServiceArea, Technician, Ticket, TicketAction},
    session::Session,
    ticketing::{self, NewTicket, TicketFilter},
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct StatusPayload {
    action: TicketAction,
}

#[derive(Deserialize)]
pub struct ClassifyPayload {
    description: String,
}

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
}

#[derive(Deserialize)]
pub struct SelectEmployeePayload {
    employee_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct TechniciansQuery {
    available: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct AreasQuery {
    sort: Option<String>,
    limit: Option<usize>,
    min_quality: Option<f64>,
}

/// Vista pública de una sesión: nunca incluye las claves, sólo qué
/// proveedores quedan activos.
#[derive(Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    session: Session,
    ai_providers: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct ChatReply {
    reply: String,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    context_sections: Vec<&'static str>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        // Sesiones
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", get(get_session_handler))
        .route("/api/sessions/:id/credentials", put(credentials_handler))
        // Tickets
        .route("/api/sessions/:id/tickets", get(list_tickets_handler).post(create_ticket_handler))
        .route("/api/sessions/:id/tickets/stats", get(ticket_stats_handler))
        .route("/api/sessions/:id/tickets/:ticket_id/status", post(ticket_status_handler))
        .route("/api/sessions/:id/classify", post(classify_handler))
        .route("/api/technicians", get(technicians_handler))
        .route("/api/categories", get(categories_handler))
        // RRHH
        .route("/api/employees", get(employees_handler))
        .route("/api/employees/:employee_id", get(employee_handler))
        .route("/api/sessions/:id/employee", put(select_employee_handler))
        .route("/api/sessions/:id/hr-chat", get(hr_history_handler).post(hr_chat_handler))
        .route("/api/hr/analytics", get(hr_analytics_handler))
        .route("/api/policies", get(policies_handler))
        .route("/api/faq", get(faq_handler))
        // Datos
        .route("/api/sessions/:id/data-chat", get(data_history_handler).post(data_chat_handler))
        .route("/api/data/summary", get(data_summary_handler))
        .route("/api/data/areas", get(data_areas_handler))
        .route("/api/data/areas/:name", get(data_area_handler))
        .route("/api/data/trends", get(data_trends_handler))
        .route("/api/data/insights", get(data_insights_handler))
        .with_state(app_state)
}

// --- Utilidades ---

fn load_session(state: &AppState, id: Uuid) -> Result<Session> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Sesión no encontrada: {id}")))
}

fn with_session<R>(state: &AppState, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
    state
        .sessions
        .with(id, f)
        .ok_or_else(|| AppError::NotFound(format!("Sesión no encontrada: {id}")))
}

fn provider_names(state: &AppState, keys: &ProviderKeys) -> Vec<&'static str> {
    state
        .llm_manager
        .configured_providers(keys)
        .into_iter()
        .map(|p| p.name())
        .collect()
}

fn session_view(state: &AppState, session: Session) -> SessionView {
    let ai_providers = provider_names(state, &session.credentials);
    SessionView { session, ai_providers }
}

fn non_empty_message(message: &str) -> Result<String> {
    let m = message.trim();
    if m.is_empty() {
        return Err(AppError::BadRequest("El mensaje no puede estar vacío.".to_string()));
    }
    Ok(m.to_string())
}

// --- Handlers: sistema ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let ds = &state.dataset;
    Json(json!({
        "status": "ok",
        "ai_providers": provider_names(&state, &ProviderKeys::default()),
        "technician_policy": state.config.technician_policy,
        "sessions": state.sessions.len(),
        "dataset": {
            "employees": ds.employees().len(),
            "technicians": ds.technicians().len(),
            "categories": ds.ticket_categories().len(),
            "service_areas": ds.service_areas().len(),
        }
    }))
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}

// --- Handlers: sesiones ---

#[axum::debug_handler]
async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.sessions.create(&state.dataset);
    info!("🆕 Sesión creada: {}", session.id);
    (StatusCode::CREATED, Json(session_view(&state, session)))
}

#[axum::debug_handler]
async fn get_session_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SessionView>> {
    let session = load_session(&state, id)?;
    Ok(Json(session_view(&state, session)))
}

#[axum::debug_handler]
async fn credentials_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(keys): AppJson<ProviderKeys>,
) -> Result<Json<Value>> {
    with_session(&state, id, |s| s.credentials = keys.clone())?;
    let providers = provider_names(&state, &keys);
    info!("🔑 Credenciales de IA actualizadas para la sesión {}: {:?}", id, providers);
    Ok(Json(json!({ "ai_providers": providers })))
}

// --- Handlers: tickets ---

#[axum::debug_handler]
async fn list_tickets_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Value>> {
    let session = load_session(&state, id)?;
    let tickets = ticketing::list(&session.tickets, &filter)?;
    Ok(Json(json!({ "tickets": tickets })))
}

#[axum::debug_handler]
async fn create_ticket_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(input): AppJson<NewTicket>,
) -> Result<impl IntoResponse> {
    let credentials = load_session(&state, id)?.credentials;
    let ticket = ticketing::create_ticket(
        &state.dataset,
        &state.llm_manager,
        state.config.technician_policy,
        &credentials,
        input,
    )
    .await?;
    let ticket = with_session(&state, id, |s| ticketing::file_ticket(s, ticket))?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

#[axum::debug_handler]
async fn ticket_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ticketing::TicketStats>> {
    let session = load_session(&state, id)?;
    Ok(Json(ticketing::stats(&session.tickets)))
}

#[axum::debug_handler]
async fn ticket_status_handler(
    State(state): State<AppState>,
    Path((id, ticket_id)): Path<(Uuid, String)>,
    AppJson(payload): AppJson<StatusPayload>,
) -> Result<Json<Ticket>> {
    let ticket = with_session(&state, id, |s| ticketing::update_status(s, &ticket_id, payload.action))??;
    info!("Ticket {} → {}", ticket.id, ticket.status);
    Ok(Json(ticket))
}

#[axum::debug_handler]
async fn classify_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ClassifyPayload>,
) -> Result<Json<ticketing::ClassifyDemo>> {
    let credentials = load_session(&state, id)?.credentials;
    let demo = ticketing::classify_demo(
        &state.dataset,
        &state.llm_manager,
        state.config.technician_policy,
        &credentials,
        &payload.description,
    )
    .await?;
    Ok(Json(demo))
}

#[axum::debug_handler]
async fn technicians_handler(State(state): State<AppState>, Query(query): Query<TechniciansQuery>) -> Json<Value> {
    let technicians: Vec<&Technician> = if query.available {
        state.dataset.available_technicians()
    } else {
        state.dataset.technicians().iter().collect()
    };
    Json(json!({ "technicians": ticketing::technician_workload(technicians) }))
}

#[axum::debug_handler]
async fn categories_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "categories": state.dataset.ticket_categories() }))
}

// --- Handlers: RRHH ---

#[axum::debug_handler]
async fn employees_handler(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Json<Value> {
    let employees: Vec<&Employee> = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => state.dataset.search_employees(q),
        None => state.dataset.employees().iter().collect(),
    };
    Json(json!({ "employees": employees }))
}

#[axum::debug_handler]
async fn employee_handler(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> Result<Json<Employee>> {
    state
        .dataset
        .employee_by_id(&employee_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Empleado no encontrado: {employee_id}")))
}

#[axum::debug_handler]
async fn select_employee_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<SelectEmployeePayload>,
) -> Result<Json<Value>> {
    let employee = match payload.employee_id.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(emp_id) => Some(
            state
                .dataset
                .employee_by_id(emp_id)
                .or_else(|| state.dataset.employee_by_name(emp_id))
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("Empleado no encontrado: {emp_id}")))?,
        ),
        None => None,
    };
    let selected = employee.as_ref().map(|e| e.id.clone());
    with_session(&state, id, |s| s.current_employee = selected)?;
    Ok(Json(json!({ "current_employee": employee })))
}

#[axum::debug_handler]
async fn hr_history_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<ChatMessage>>> {
    Ok(Json(load_session(&state, id)?.hr_history))
}

#[axum::debug_handler]
async fn hr_chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Result<Json<ChatReply>> {
    let message = non_empty_message(&payload.message)?;
    let session = load_session(&state, id)?;

    let employee = session
        .current_employee
        .as_deref()
        .and_then(|emp_id| state.dataset.employee_by_id(emp_id));

    let mut context = employee_context(employee);
    context.push_str(&assemble_hr_context(&message, &state.dataset));

    let outcome = state
        .llm_manager
        .hr_response(&message, employee, &context, &session.credentials)
        .await;

    let reply = outcome.value.clone();
    with_session(&state, id, |s| {
        s.hr_history.push(ChatMessage::user(message));
        s.hr_history.push(ChatMessage::assistant(reply));
    })?;

    Ok(Json(ChatReply { reply: outcome.value, source: outcome.source, chart: None, context_sections: Vec::new() }))
}

#[axum::debug_handler]
async fn hr_analytics_handler(State(state): State<AppState>) -> Json<Value> {
    let employees = state.dataset.employees();
    Json(json!({
        "total_employees": employees.len(),
        "departments": state.dataset.departments(),
        "department_distribution": analytics::department_distribution(employees),
        "average_leave_balance": analytics::average_leave_balance(employees),
    }))
}

#[axum::debug_handler]
async fn policies_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "hr_policies": state.dataset.hr_policies(),
        "leave_policies": state.dataset.leave_policies(),
    }))
}

#[axum::debug_handler]
async fn faq_handler(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Json<Value> {
    let faq = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => state.dataset.search_faq(q),
        None => state.dataset.onboarding_faq().iter().collect(),
    };
    Json(json!({ "faq": faq }))
}

// --- Handlers: datos operativos ---

#[axum::debug_handler]
async fn data_history_handler(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<ChatMessage>>> {
    Ok(Json(load_session(&state, id)?.data_history))
}

#[axum::debug_handler]
async fn data_chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ChatPayload>,
) -> Result<Json<ChatReply>> {
    let message = non_empty_message(&payload.message)?;
    let credentials = load_session(&state, id)?.credentials;

    let context = assemble_data_context(&message, &state.dataset);
    let outcome = state.llm_manager.data_insights(&message, &context, &credentials).await;
    let chart = select_chart(&message, &state.dataset);

    let mut answer = ChatMessage::assistant(outcome.value.clone());
    answer.chart = chart.clone();
    with_session(&state, id, |s| {
        s.data_history.push(ChatMessage::user(message));
        s.data_history.push(answer);
    })?;

    Ok(Json(ChatReply {
        reply: outcome.value,
        source: outcome.source,
        chart,
        context_sections: context.sections(),
    }))
}

#[axum::debug_handler]
async fn data_summary_handler(State(state): State<AppState>) -> Json<analytics::SummaryStats> {
    Json(state.dataset.summary_stats())
}

#[axum::debug_handler]
async fn data_areas_handler(State(state): State<AppState>, Query(query): Query<AreasQuery>) -> Result<Json<Value>> {
    let ds = &state.dataset;
    let selected: Vec<ServiceArea> = match query.min_quality {
        Some(min) => ds.filter_areas_by_quality(min).into_iter().cloned().collect(),
        None => ds.service_areas().to_vec(),
    };
    let mut areas = match query.sort.as_deref() {
        None | Some("") => selected,
        Some("consumption") => analytics::top_by_consumption(&selected, usize::MAX),
        Some("quality") => analytics::top_by_quality(&selected, usize::MAX),
        Some(other) => return Err(AppError::BadRequest(format!("Orden no soportado: {other}"))),
    };
    if let Some(limit) = query.limit {
        areas.truncate(limit);
    }
    Ok(Json(json!({ "service_areas": areas })))
}

#[axum::debug_handler]
async fn data_area_handler(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<ServiceArea>> {
    state
        .dataset
        .area_by_name(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Área de servicio no encontrada: {name}")))
}

#[axum::debug_handler]
async fn data_trends_handler(State(state): State<AppState>) -> Json<Value> {
    let trends = state.dataset.monthly_trends();
    Json(json!({
        "monthly_trends": trends,
        "latest_change": analytics::recent_trend(trends),
    }))
}

#[axum::debug_handler]
async fn data_insights_handler(State(state): State<AppState>) -> Json<Value> {
    let ds = &state.dataset;
    let areas = ds.service_areas();
    Json(json!({
        "summary": ds.summary_stats(),
        "top_consumption": ds.top_consuming_areas(3),
        "top_quality": analytics::top_by_quality(areas, 3),
        "total_consumption_billion_liters": analytics::round1(analytics::total_consumption_billion(areas)),
        "latest_change": analytics::recent_trend(ds.monthly_trends()),
    }))
}
