//! Estado por sesión de usuario: tickets, historiales de chat, empleado
//! seleccionado y credenciales de IA introducidas por el usuario.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::ProviderKeys,
    dataset::Dataset,
    models::{ChatMessage, Ticket},
};

pub const TICKET_PREFIX: &str = "TKT";

const HR_GREETING: &str = "Hello! I'm your Manila Water HR Assistant. I can help with leave requests, \
     policies, benefits and onboarding questions. How can I help you today?";
const DATA_GREETING: &str = "Hi! I'm your Manila Water Data Analytics assistant. Ask me about consumption, \
     water quality, monthly trends or infrastructure across our service areas.";

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Local>,
    pub tickets: Vec<Ticket>,
    pub next_ticket_seq: u32,
    pub hr_history: Vec<ChatMessage>,
    pub data_history: Vec<ChatMessage>,
    pub current_employee: Option<String>,
    #[serde(skip)]
    pub credentials: ProviderKeys,
}

/// Número de secuencia de un id `TKTnnn`, si lo tiene.
pub fn ticket_seq(id: &str) -> Option<u32> {
    id.strip_prefix(TICKET_PREFIX)?.parse().ok()
}

impl Session {
    /// Nueva sesión sembrada con los tickets de ejemplo y los saludos.
    pub fn seeded(dataset: &Dataset) -> Self {
        let tickets = dataset.sample_tickets().to_vec();
        let next_ticket_seq = tickets
            .iter()
            .filter_map(|t| ticket_seq(&t.id))
            .max()
            .map_or(1, |max| max + 1);

        Self {
            id: Uuid::new_v4(),
            created_at: Local::now(),
            tickets,
            next_ticket_seq,
            hr_history: vec![ChatMessage::assistant(HR_GREETING)],
            data_history: vec![ChatMessage::assistant(DATA_GREETING)],
            current_employee: None,
            credentials: ProviderKeys::default(),
        }
    }

    /// Reserva el siguiente id de ticket de la sesión.
    pub fn allocate_ticket_id(&mut self) -> String {
        let id = format!("{TICKET_PREFIX}{:03}", self.next_ticket_seq);
        self.next_ticket_seq += 1;
        id
    }

    pub fn ticket_mut(&mut self, id: &str) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == id)
    }
}

/// Almacén de sesiones en memoria compartido por los handlers.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, dataset: &Dataset) -> Session {
        let session = Session::seeded(dataset);
        self.lock().insert(session.id, session.clone());
        session
    }

    /// Copia de la sesión. Los handlers trabajan sobre copias para no
    /// mantener el candado durante las llamadas al LLM.
    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.lock().get(&id).cloned()
    }

    /// Ejecuta `f` con acceso exclusivo a la sesión.
    pub fn with<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Session>> {
        // Un pánico con el candado tomado no invalida el mapa.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
