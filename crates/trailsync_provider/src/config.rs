use crate::ProviderError;
use secrecy::SecretString;

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub user_id: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Reads configuration through the provided lookup so tests can inject
    /// values without touching the process environment. All three variables
    /// are required; there is no sensible default provider endpoint.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, ProviderError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api = get("TRAILSYNC_API_KEY")
            .ok_or_else(|| ProviderError::Config("TRAILSYNC_API_KEY missing".into()))?;
        let user_id = get("TRAILSYNC_USER_ID")
            .ok_or_else(|| ProviderError::Config("TRAILSYNC_USER_ID missing".into()))?;
        let base_url = get("TRAILSYNC_PROVIDER_URL")
            .ok_or_else(|| ProviderError::Config("TRAILSYNC_PROVIDER_URL missing".into()))?;
        Ok(Self {
            api_key: SecretString::new(api.into()),
            user_id,
            base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_missing_api_key() {
        let get = |k: &str| match k {
            "TRAILSYNC_API_KEY" => None,
            "TRAILSYNC_USER_ID" => Some("u1".into()),
            "TRAILSYNC_PROVIDER_URL" => Some("http://localhost".into()),
            _ => None,
        };
        let res = Config::from_env_with(get);
        assert!(res.is_err());
    }

    #[test]
    fn from_env_missing_base_url() {
        let get = |k: &str| match k {
            "TRAILSYNC_API_KEY" => Some("sekrit".into()),
            "TRAILSYNC_USER_ID" => Some("u1".into()),
            _ => None,
        };
        let res = Config::from_env_with(get);
        assert!(res.is_err());
    }

    #[test]
    fn from_env_reads_values() {
        let get = |k: &str| match k {
            "TRAILSYNC_API_KEY" => Some("sekrit".into()),
            "TRAILSYNC_USER_ID" => Some("u1".into()),
            "TRAILSYNC_PROVIDER_URL" => Some("http://localhost".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.user_id, "u1");
        assert_eq!(cfg.base_url, "http://localhost");
    }
}
