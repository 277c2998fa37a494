use std::env;

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct Config {
    /// When unset the service runs on the in-memory store.
    pub mongo_uri: Option<String>,
    pub database_name: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub frontend_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config("JWT_SECRET must be set".to_string()))?;

        Ok(Self {
            mongo_uri: lookup("MONGO_URI").filter(|s| !s.trim().is_empty()),
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| "taskbuddy".to_string()),
            jwt_secret,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            frontend_origin: lookup("FRONTEND_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }
}
