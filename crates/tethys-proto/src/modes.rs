use std::collections::HashMap;

/// Named-mode to custom-mode-id mapping. The vehicle-reported table (when
/// one is available) takes precedence; otherwise the static ArduSub-style
/// defaults apply.
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    vehicle: Option<HashMap<String, u32>>,
}

const DEFAULT_MODES: &[(&str, u32)] = &[
    ("STABILIZE", 0),
    ("ACRO", 1),
    ("ALT_HOLD", 2),
    ("AUTO", 3),
    ("GUIDED", 4),
    ("LOITER", 5),
    ("RTL", 6),
    ("CIRCLE", 7),
    ("LAND", 9),
    ("MANUAL", 10),
    ("POSHOLD", 16),
    ("BRAKE", 11),
];

impl ModeTable {
    pub fn with_vehicle_table(table: HashMap<String, u32>) -> Self {
        Self { vehicle: Some(table) }
    }

    /// Resolve a mode name (case-insensitive) to its numeric id. Checks the
    /// vehicle-reported table first, then the static defaults.
    pub fn resolve(&self, name: &str) -> Option<u32> {
        let upper = name.to_ascii_uppercase();
        if let Some(id) = self.vehicle.as_ref().and_then(|v| v.get(&upper).copied()) {
            return Some(id);
        }
        DEFAULT_MODES
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, id)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_resolves_manual_to_10() {
        let t = ModeTable::default();
        assert_eq!(t.resolve("MANUAL"), Some(10));
        assert_eq!(t.resolve("manual"), Some(10));
    }

    #[test]
    fn default_table_covers_all_known_modes() {
        let t = ModeTable::default();
        assert_eq!(t.resolve("STABILIZE"), Some(0));
        assert_eq!(t.resolve("ALT_HOLD"), Some(2));
        assert_eq!(t.resolve("POSHOLD"), Some(16));
        assert_eq!(t.resolve("BRAKE"), Some(11));
    }

    #[test]
    fn unknown_mode_is_none() {
        assert_eq!(ModeTable::default().resolve("DOES_NOT_EXIST"), None);
    }

    #[test]
    fn vehicle_table_takes_precedence() {
        let mut m = HashMap::new();
        m.insert("MANUAL".to_string(), 19);
        let t = ModeTable::with_vehicle_table(m);
        assert_eq!(t.resolve("MANUAL"), Some(19));
        // names missing from the vehicle table fall back to the defaults
        assert_eq!(t.resolve("STABILIZE"), Some(0));
    }
}
