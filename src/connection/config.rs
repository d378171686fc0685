use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DATABASE_ID: &str = "(default)";
pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Delay curve between transaction attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Multiplier applied after every wait
    pub backoff_factor: f64,

    /// Upper bound for any single wait
    pub max_delay: Duration,

    /// Width of the random jitter band relative to the base delay
    /// (1.0 means +/- 50%)
    pub jitter_factor: f64,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 1.5,
            max_delay: Duration::from_millis(60_000),
            jitter_factor: 1.0,
        }
    }
}

impl BackoffSettings {
    /// Settings without jitter, so every delay is exactly predictable
    pub fn deterministic(initial_delay: Duration, backoff_factor: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            backoff_factor,
            max_delay,
            jitter_factor: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_factor < 1.0 || !self.backoff_factor.is_finite() {
            return Err("backoff_factor must be a finite number >= 1.0".to_string());
        }

        if self.initial_delay > self.max_delay {
            return Err("initial_delay cannot exceed max_delay".to_string());
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("jitter_factor must be within [0, 1]".to_string());
        }

        Ok(())
    }
}

/// Client configuration
///
/// Identifies the target database and the defaults applied to every
/// transaction the client runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Project that owns the database
    pub project_id: String,

    /// Database id within the project
    pub database_id: String,

    /// Attempts per `run_transaction` unless overridden
    pub max_attempts: usize,

    /// Backoff between transaction attempts
    pub backoff: BackoffSettings,
}

impl ClientConfig {
    /// Create a configuration for the default database of `project_id`
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            max_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
            backoff: BackoffSettings::default(),
        }
    }

    /// Set the database id
    pub fn database(mut self, database_id: &str) -> Self {
        self.database_id = database_id.to_string();
        self
    }

    /// Set the default number of transaction attempts
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the backoff curve
    pub fn backoff(mut self, backoff: BackoffSettings) -> Self {
        self.backoff = backoff;
        self
    }

    /// Parse from a database resource name
    ///
    /// Format: "projects/{project_id}/databases/{database_id}"
    ///
    /// # Examples
    ///
    /// ```
    /// use docdb_client::ClientConfig;
    ///
    /// let config = ClientConfig::from_database_name("projects/acme/databases/orders").unwrap();
    /// assert_eq!(config.project_id, "acme");
    /// assert_eq!(config.database_id, "orders");
    /// ```
    pub fn from_database_name(name: &str) -> Result<Self, String> {
        let parts: Vec<&str> = name.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            ["projects", project, "databases", database]
                if !project.is_empty() && !database.is_empty() =>
            {
                Ok(Self::new(project).database(database))
            }
            _ => Err(format!(
                "Invalid database name '{}': expected projects/{{project}}/databases/{{database}}",
                name
            )),
        }
    }

    /// Database resource name sent with every RPC
    pub fn database_name(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database_id)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.project_id.is_empty() {
            return Err("project_id cannot be empty".to_string());
        }

        if self.project_id.contains('/') || self.database_id.contains('/') {
            return Err("project_id and database_id cannot contain '/'".to_string());
        }

        if self.database_id.is_empty() {
            return Err("database_id cannot be empty".to_string());
        }

        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }

        self.backoff.validate()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("default-project")
    }
}
