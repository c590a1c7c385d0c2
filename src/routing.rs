//! Asignación de técnicos a tickets.
//!
//! Sólo se consideran técnicos `Available`. Se prueban tres niveles en orden:
//!   1. especialidad contiene la categoría y zona contiene el área;
//!   2. especialidad contiene la categoría;
//!   3. cualquier técnico disponible.
//! Dentro de un nivel decide la política configurada.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::models::Technician;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// El primero en el orden del fichero de datos.
    FirstMatch,
    /// El de menor carga relativa; a igualdad, el primero.
    LeastLoaded,
}

impl MatchPolicy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first-match" | "first_match" | "first" => Ok(Self::FirstMatch),
            "least-loaded" | "least_loaded" | "least" => Ok(Self::LeastLoaded),
            other => Err(anyhow!("Política de asignación no soportada: {other}")),
        }
    }

    fn pick<'a>(self, candidates: &[&'a Technician]) -> Option<&'a Technician> {
        match self {
            Self::FirstMatch => candidates.first().copied(),
            Self::LeastLoaded => candidates.iter().copied().fold(None, |best, t| match best {
                Some(b) if b.load_ratio() <= t.load_ratio() => Some(b),
                _ => Some(t),
            }),
        }
    }
}

/// Elige un técnico para `category` (y opcionalmente `area`). Devuelve `None`
/// si no hay ningún técnico disponible.
pub fn find_best_technician<'a>(
    technicians: &'a [Technician],
    category: &str,
    area: Option<&str>,
    policy: MatchPolicy,
) -> Option<&'a Technician> {
    let available: Vec<&Technician> = technicians.iter().filter(|t| t.is_available()).collect();
    if available.is_empty() {
        return None;
    }

    let category = category.trim().to_lowercase();
    let area = area.map(|a| a.trim().to_lowercase()).filter(|a| !a.is_empty());

    let by_category: Vec<&Technician> = if category.is_empty() {
        Vec::new()
    } else {
        available
            .iter()
            .copied()
            .filter(|t| t.specialty.to_lowercase().contains(&category))
            .collect()
    };

    if let Some(area) = &area {
        let by_both: Vec<&Technician> = by_category
            .iter()
            .copied()
            .filter(|t| t.zone.to_lowercase().contains(area))
            .collect();
        if let Some(tech) = policy.pick(&by_both) {
            return Some(tech);
        }
    }

    policy.pick(&by_category).or_else(|| policy.pick(&available))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TechnicianStatus;

    fn tech(name: &str, specialty: &str, zone: &str, available: bool, load: u32, cap: u32) -> Technician {
        Technician {
            id: name.to_string(),
            name: name.to_string(),
            specialty: specialty.to_string(),
            zone: zone.to_string(),
            status: if available { TechnicianStatus::Available } else { TechnicianStatus::Unavailable },
            current_workload: load,
            max_capacity: cap,
        }
    }

    fn crew() -> Vec<Technician> {
        vec![
            tech("Busy Quality", "Water Quality Issues", "Makati", false, 1, 5),
            tech("Rosa", "Billing Inquiries", "Manila", true, 4, 8),
            tech("Patricia", "Water Quality Issues", "BGC", true, 4, 5),
            tech("Elena", "Water Quality Issues", "Makati, Manila", true, 1, 5),
            tech("Miguel", "Service Interruption", "Makati", true, 0, 6),
        ]
    }

    #[test]
    fn category_and_area_match_wins() {
        let crew = crew();
        let t = find_best_technician(&crew, "water quality issues", Some("makati"), MatchPolicy::FirstMatch).unwrap();
        assert_eq!(t.name, "Elena");
    }

    #[test]
    fn category_only_when_area_has_no_specialist() {
        let crew = crew();
        let first = find_best_technician(&crew, "Water Quality Issues", Some("Taguig"), MatchPolicy::FirstMatch).unwrap();
        assert_eq!(first.name, "Patricia");
        let least = find_best_technician(&crew, "Water Quality Issues", Some("Taguig"), MatchPolicy::LeastLoaded).unwrap();
        assert_eq!(least.name, "Elena");
    }

    #[test]
    fn category_match_without_area() {
        let crew = crew();
        let t = find_best_technician(&crew, "Service Interruption", None, MatchPolicy::FirstMatch).unwrap();
        assert_eq!(t.name, "Miguel");
    }

    #[test]
    fn falls_back_to_any_available() {
        let crew = crew();
        let first = find_best_technician(&crew, "Astrology", None, MatchPolicy::FirstMatch).unwrap();
        assert_eq!(first.name, "Rosa");
        let least = find_best_technician(&crew, "Astrology", None, MatchPolicy::LeastLoaded).unwrap();
        assert_eq!(least.name, "Miguel");
    }

    #[test]
    fn never_returns_unavailable_technician() {
        let crew = crew();
        for category in ["Water Quality Issues", "Billing Inquiries", "", "Meter"] {
            for area in [None, Some("Makati"), Some("Nowhere")] {
                for policy in [MatchPolicy::FirstMatch, MatchPolicy::LeastLoaded] {
                    let t = find_best_technician(&crew, category, area, policy).unwrap();
                    assert!(t.is_available(), "{category:?} {area:?} -> {}", t.name);
                }
            }
        }
    }

    #[test]
    fn nobody_available_is_none() {
        let crew = vec![tech("Off", "Water Quality Issues", "Makati", false, 0, 3)];
        assert!(find_best_technician(&crew, "Water Quality Issues", Some("Makati"), MatchPolicy::LeastLoaded).is_none());
        assert!(find_best_technician(&[], "x", None, MatchPolicy::FirstMatch).is_none());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(MatchPolicy::from_str("First-Match").unwrap(), MatchPolicy::FirstMatch);
        assert_eq!(MatchPolicy::from_str("least_loaded").unwrap(), MatchPolicy::LeastLoaded);
        assert!(MatchPolicy::from_str("random").is_err());
    }
}
