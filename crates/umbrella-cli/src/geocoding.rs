use crate::model::SelectedLocation;

/// A place returned by the geocoder, or built from raw coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ResolvedLocation {
    pub fn from_coordinates(lat: f64, lon: f64, name: Option<&str>) -> Self {
        Self {
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| coordinate_label(lat, lon)),
            latitude: lat,
            longitude: lon,
        }
    }

    pub fn into_selected(self, saved_at_ms: i64) -> SelectedLocation {
        SelectedLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            name: self.name,
            saved_at_ms,
        }
    }
}

pub fn coordinate_label(lat: f64, lon: f64) -> String {
    format!("{:.4},{:.4}", round4(lat), round4(lon))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geocoding_coordinate_label_is_deterministic() {
        assert_eq!(
            coordinate_label(37.5665123, 126.9780123),
            "37.5665,126.9780"
        );
    }

    #[test]
    fn geocoding_unnamed_coordinates_use_label() {
        let location = ResolvedLocation::from_coordinates(35.1796, 129.0756, None);
        assert_eq!(location.name, "35.1796,129.0756");

        let selected = location.into_selected(1_700_000_000_000);
        assert_eq!(selected.saved_at_ms, 1_700_000_000_000);
        assert_eq!(selected.latitude, 35.1796);
    }
}
