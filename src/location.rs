use serde::{Deserialize, Serialize};

/// A place given either as a free-form address or as coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl LocationInput {
    pub fn address(address: impl Into<String>) -> Self {
        LocationInput {
            address: Some(address.into()),
            ..Default::default()
        }
    }

    pub fn coordinates(lat: f64, lng: f64) -> Self {
        LocationInput {
            address: None,
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    fn non_empty_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }

    fn valid_coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) =>
            {
                Some((lat, lng))
            }
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.non_empty_address().is_some() || self.valid_coordinates().is_some()
    }

    /// Form used in mapping service queries: `lat,lng`.
    pub fn query_param(&self) -> String {
        self.render(",")
    }

    /// Human form used in prompts and fallbacks: `lat, lng`.
    pub fn label(&self) -> String {
        self.render(", ")
    }

    fn render(&self, separator: &str) -> String {
        if let Some(address) = self.non_empty_address() {
            return address.to_string();
        }
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => format!("{lat}{separator}{lng}"),
            _ => String::new(),
        }
    }
}
