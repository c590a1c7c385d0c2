//! Tablas de reglas por palabra clave.
//!
//! Cada tabla es una lista ordenada de pares (palabras clave, acción). Una regla
//! coincide si el texto, en minúsculas, contiene alguna de sus palabras clave.

#[derive(Debug, Clone, Copy)]
pub struct KeywordRule<T> {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub action: T,
}

impl<T> KeywordRule<T> {
    /// Devuelve la primera palabra clave contenida en `text_lower`.
    pub fn matched_keyword(&self, text_lower: &str) -> Option<&'static str> {
        self.keywords.iter().copied().find(|k| text_lower.contains(k))
    }

    pub fn matches(&self, text_lower: &str) -> bool {
        self.matched_keyword(text_lower).is_some()
    }
}

/// Lista ordenada de reglas sin exclusividad: un texto puede activar varias.
#[derive(Debug, Clone, Copy)]
pub struct RuleSet<T: 'static> {
    rules: &'static [KeywordRule<T>],
}

impl<T: 'static> RuleSet<T> {
    pub const fn new(rules: &'static [KeywordRule<T>]) -> Self {
        Self { rules }
    }

    pub fn first_match(&self, text: &str) -> Option<&'static KeywordRule<T>> {
        self.first_match_lower(&text.to_lowercase())
    }

    /// Igual que `first_match`, para un texto que ya está en minúsculas.
    pub fn first_match_lower(&self, text_lower: &str) -> Option<&'static KeywordRule<T>> {
        self.rules.iter().find(|r| r.matches(text_lower))
    }

    pub fn all_matches(&self, text: &str) -> Vec<&'static KeywordRule<T>> {
        let lower = text.to_lowercase();
        self.rules.iter().filter(|r| r.matches(&lower)).collect()
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static RULES: [KeywordRule<u8>; 3] = [
        KeywordRule { name: "a", keywords: &["water", "agua"], action: 1 },
        KeywordRule { name: "b", keywords: &["bill"], action: 2 },
        KeywordRule { name: "c", keywords: &["water bill"], action: 3 },
    ];

    #[test]
    fn first_match_respects_order() {
        let set = RuleSet::new(&RULES);
        assert_eq!(set.first_match("My WATER bill").map(|r| r.action), Some(1));
        assert!(set.first_match("nothing here").is_none());
    }

    #[test]
    fn all_matches_is_not_exclusive() {
        let set = RuleSet::new(&RULES);
        let names: Vec<_> = set.all_matches("water bill please").iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn lowercased_lookup_agrees_with_first_match() {
        let set = RuleSet::new(&RULES);
        assert_eq!(set.first_match_lower("my bill").map(|r| r.name), Some("b"));
        assert_eq!(set.first_match_lower("my bill").map(|r| r.name), set.first_match("MY BILL").map(|r| r.name));
        // sin minúsculas previas no hay coincidencia
        assert!(set.first_match_lower("MY BILL").is_none());
    }

    #[test]
    fn matched_keyword_reports_the_hit() {
        assert_eq!(RULES[0].matched_keyword("sin agua"), Some("agua"));
    }
}
