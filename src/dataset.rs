//! Carga de los ficheros JSON estáticos (empleados, tickets, datos de agua y
//! políticas de RRHH). Se leen una sola vez al arrancar y quedan en memoria,
//! de sólo lectura, durante toda la vida del proceso.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    analytics::{self, SummaryStats},
    models::{Category, Employee, FaqEntry, MonthlyTrend, ServiceArea, Technician, Ticket},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmployeesFile {
    pub employees: Vec<Employee>,
    pub departments: Vec<String>,
    pub leave_policies: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsFile {
    pub ticket_categories: Vec<Category>,
    pub technicians: Vec<Technician>,
    pub sample_tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterDataFile {
    pub service_areas: Vec<ServiceArea>,
    pub operational_metrics: Value,
    pub monthly_trends: Vec<MonthlyTrend>,
    pub water_quality_parameters: Value,
    pub infrastructure_status: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesFile {
    pub hr_policies: Map<String, Value>,
    pub onboarding_faq: Vec<FaqEntry>,
}

/// Conjunto de datos completo de la demo.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub employees: EmployeesFile,
    pub tickets: TicketsFile,
    pub water: WaterDataFile,
    pub policies: PoliciesFile,
}

/// Lee un fichero JSON. Un fichero ausente o mal formado se registra una vez y
/// se sustituye por una sección vacía.
fn load_section<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            warn!("No se pudo cargar {}: {:#}. Se usará un conjunto vacío.", path.display(), e);
            T::default()
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| "fichero no encontrado o ilegible")?;
    let value = serde_json::from_str(&raw).with_context(|| "formato JSON inválido")?;
    Ok(value)
}

impl Dataset {
    pub fn load(dir: &Path) -> Self {
        let dataset = Self {
            employees: load_section(&dir.join("employees.json")),
            tickets: load_section(&dir.join("tickets.json")),
            water: load_section(&dir.join("water_data.json")),
            policies: load_section(&dir.join("policies.json")),
        };
        info!(
            "Datos cargados desde {}: {} empleados, {} técnicos, {} áreas de servicio.",
            dir.display(),
            dataset.employees.employees.len(),
            dataset.tickets.technicians.len(),
            dataset.water.service_areas.len()
        );
        dataset
    }

    // --- Empleados y RRHH ---

    pub fn employees(&self) -> &[Employee] {
        &self.employees.employees
    }

    pub fn employee_by_id(&self, id: &str) -> Option<&Employee> {
        self.employees().iter().find(|e| e.id == id)
    }

    pub fn employee_by_name(&self, name: &str) -> Option<&Employee> {
        self.employees().iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Busca por nombre, departamento o puesto (subcadena, sin distinguir mayúsculas).
    pub fn search_employees(&self, query: &str) -> Vec<&Employee> {
        let q = query.to_lowercase();
        self.employees()
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&q)
                    || e.department.to_lowercase().contains(&q)
                    || e.position.to_lowercase().contains(&q)
            })
            .collect()
    }

    pub fn departments(&self) -> &[String] {
        &self.employees.departments
    }

    pub fn leave_policies(&self) -> &Value {
        &self.employees.leave_policies
    }

    pub fn hr_policies(&self) -> &Map<String, Value> {
        &self.policies.hr_policies
    }

    pub fn policy_by_name(&self, name: &str) -> Option<&Value> {
        self.policies.hr_policies.get(name)
    }

    pub fn onboarding_faq(&self) -> &[FaqEntry] {
        &self.policies.onboarding_faq
    }

    pub fn search_faq(&self, query: &str) -> Vec<&FaqEntry> {
        let q = query.to_lowercase();
        self.onboarding_faq()
            .iter()
            .filter(|f| f.question.to_lowercase().contains(&q) || f.answer.to_lowercase().contains(&q))
            .collect()
    }

    // --- Tickets ---

    pub fn ticket_categories(&self) -> &[Category] {
        &self.tickets.ticket_categories
    }

    pub fn category_names(&self) -> Vec<String> {
        self.ticket_categories().iter().map(|c| c.name.clone()).collect()
    }

    pub fn technicians(&self) -> &[Technician] {
        &self.tickets.technicians
    }

    pub fn available_technicians(&self) -> Vec<&Technician> {
        self.technicians().iter().filter(|t| t.is_available()).collect()
    }

    pub fn sample_tickets(&self) -> &[Ticket] {
        &self.tickets.sample_tickets
    }

    // --- Datos operativos ---

    pub fn service_areas(&self) -> &[ServiceArea] {
        &self.water.service_areas
    }

    pub fn area_by_name(&self, name: &str) -> Option<&ServiceArea> {
        self.service_areas().iter().find(|a| a.area.eq_ignore_ascii_case(name))
    }

    pub fn monthly_trends(&self) -> &[MonthlyTrend] {
        &self.water.monthly_trends
    }

    pub fn operational_metrics(&self) -> &Value {
        &self.water.operational_metrics
    }

    pub fn water_quality_parameters(&self) -> &Value {
        &self.water.water_quality_parameters
    }

    pub fn infrastructure_status(&self) -> &Value {
        &self.water.infrastructure_status
    }

    pub fn top_consuming_areas(&self, limit: usize) -> Vec<ServiceArea> {
        analytics::top_by_consumption(self.service_areas(), limit)
    }

    pub fn filter_areas_by_quality(&self, min_score: f64) -> Vec<&ServiceArea> {
        self.service_areas()
            .iter()
            .filter(|a| a.water_quality_score >= min_score)
            .collect()
    }

    pub fn summary_stats(&self) -> SummaryStats {
        analytics::summary_stats(self.service_areas(), self.operational_metrics())
    }
}

#[cfg(test)]
pub(crate) fn fixture() -> Dataset {
    Dataset::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("data"))
}
