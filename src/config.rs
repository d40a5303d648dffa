use std::{fmt, net::Ipv4Addr, str::FromStr};

use menva::FromEnv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Env {
    Development,
    Production,
    Test,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Env::Development),
            "production" => Ok(Env::Production),
            "test" => Ok(Env::Test),
            _ => Err(format!("Invalid value for enum Env: {}", s)),
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, FromEnv)]
pub struct Config {
    pub env: Env,
    ip: Ipv4Addr,
    port: u16,
    domain: String,
    pub worker_threads: usize,
    pub database_url: String,
    pub secret_key: String,
    pub session_cookie_name: String,
    pub csrf_cookie_name: String,
    pub session_expiration: i64,
    pub confirmation_expiration: i64,
    pub mail_subject_prefix: String,
    pub mail_sender: String,
    pub admin_email: String,
    pub smtp_relay: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub groups_per_page: i64,
    pub comments_per_page: i64,
    pub utc_offset_hours: i32,
    sentry_dsn: String,
}

impl Config {
    pub fn stub() -> Self {
        Self {
            env: Env::Test,
            ip: Ipv4Addr::new(127, 0, 0, 1),
            port: 8000,
            domain: "localhost".into(),
            worker_threads: 1,
            database_url: "sqlite://./test.sqlite".into(),
            secret_key: "hard to guess".into(),
            session_cookie_name: "session_id".into(),
            csrf_cookie_name: "csrf_token".into(),
            session_expiration: 30,
            confirmation_expiration: 3600,
            mail_subject_prefix: "[Carpool]".into(),
            mail_sender: "carpool@example.com".into(),
            admin_email: "admin@example.com".into(),
            smtp_relay: "smtp.example.com".into(),
            smtp_port: 25,
            smtp_username: "smtp_username".into(),
            smtp_password: "smtp_password".into(),
            groups_per_page: 10,
            comments_per_page: 10,
            utc_offset_hours: 8,
            sentry_dsn: String::new(),
        }
    }

    pub fn socket_addr(&self) -> (Ipv4Addr, u16) {
        (self.ip, self.port)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn sentry_dsn(&self) -> Option<&str> {
        (!self.sentry_dsn.is_empty()).then_some(self.sentry_dsn.as_str())
    }

    pub fn is_production(&self) -> bool {
        self.env == Env::Production
    }

    pub fn build_url(&self, path: &str) -> String {
        if self.is_production() {
            format!("https://{}{}", self.domain, path)
        } else {
            format!("http://{}:{}{}", self.domain, self.port, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_from_str() {
        assert_eq!("Production".parse::<Env>(), Ok(Env::Production));
        assert!("staging".parse::<Env>().is_err());
    }

    #[test]
    fn test_build_url() {
        let mut config = Config::stub();
        assert_eq!(
            config.build_url("/auth/confirm/abc"),
            "http://localhost:8000/auth/confirm/abc"
        );
        config.env = Env::Production;
        config.domain = "carpool.example.com".into();
        assert_eq!(
            config.build_url("/auth/confirm/abc"),
            "https://carpool.example.com/auth/confirm/abc"
        );
    }

    #[test]
    fn test_sentry_disabled_when_empty() {
        assert_eq!(Config::stub().sentry_dsn(), None);
    }
}
