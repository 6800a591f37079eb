use log::warn;

use crate::shared::constants::PLACEHOLDER_LOCATION;

/// Source of the capture location attached to each record.
pub trait LocationProvider: Send {
    /// Current location as a "lat,lon" string.
    fn current_location(&self) -> Result<String, Box<dyn std::error::Error>>;
}

/// Always reports the same location. Used for fixed camera installs and
/// tests.
pub struct FixedLocationProvider {
    location: String,
}

impl FixedLocationProvider {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

impl LocationProvider for FixedLocationProvider {
    fn current_location(&self) -> Result<String, Box<dyn std::error::Error>> {
        Ok(self.location.clone())
    }
}

/// Fetches the location from an HTTP endpoint returning a plain-text
/// "lat,lon" body.
pub struct HttpLocationProvider {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpLocationProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            url: url.into(),
        }
    }
}

impl LocationProvider for HttpLocationProvider {
    fn current_location(&self) -> Result<String, Box<dyn std::error::Error>> {
        let text = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(text.trim().to_string())
    }
}

/// Resolve the location, falling back to the placeholder when the provider
/// fails. A record is never dropped over a missing location.
pub fn location_or_placeholder(provider: &dyn LocationProvider) -> String {
    match provider.current_location() {
        Ok(location) => location,
        Err(e) => {
            warn!("Location lookup failed, using placeholder: {e}");
            PLACEHOLDER_LOCATION.to_string()
        }
    }
}
