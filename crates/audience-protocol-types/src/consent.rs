use serde::{Deserialize, Serialize};

/// Tri-state privacy consent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsentStatus {
    #[serde(rename = "optedin")]
    OptIn,
    #[serde(rename = "optedout")]
    OptOut,
    #[default]
    #[serde(rename = "optunknown")]
    Unknown,
}

impl ConsentStatus {
    /// Parse the configuration string form. Anything unrecognized is Unknown.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "optedin" => ConsentStatus::OptIn,
            "optedout" => ConsentStatus::OptOut,
            _ => ConsentStatus::Unknown,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            ConsentStatus::OptIn => "optedin",
            ConsentStatus::OptOut => "optedout",
            ConsentStatus::Unknown => "optunknown",
        }
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire() {
        assert_eq!(ConsentStatus::from_wire("optedin"), ConsentStatus::OptIn);
        assert_eq!(ConsentStatus::from_wire("optedout"), ConsentStatus::OptOut);
        assert_eq!(ConsentStatus::from_wire("optunknown"), ConsentStatus::Unknown);
        assert_eq!(ConsentStatus::from_wire("OPTEDIN"), ConsentStatus::Unknown);
    }

    #[test]
    fn test_serde_uses_wire_strings() {
        let json = serde_json::to_string(&ConsentStatus::OptOut).unwrap();
        assert_eq!(json, "\"optedout\"");
        let parsed: ConsentStatus = serde_json::from_str("\"optedin\"").unwrap();
        assert_eq!(parsed, ConsentStatus::OptIn);
    }
}
