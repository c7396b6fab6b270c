use ferrule_core::Feature;

/// Server-level configuration for the request-handling core.
///
/// Controls which features are reachable and whether diagnostic output may
/// be requested by clients.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Service-wide enabled features. `Feature::all()` means unrestricted.
    pub enabled_features: Feature,
    /// Allows `?debug` requests and the debug listing endpoint to answer
    /// with plain-text diagnostic output.
    pub debug_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled_features: Feature::all(),
            debug_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert!(!config.enabled_features.is_restricted());
        assert!(!config.debug_mode);
    }
}
