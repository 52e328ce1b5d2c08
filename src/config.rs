use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, read once at startup. Every value has a logged
/// default so a bare environment still boots a development server.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_exp_seconds: i64,
    pub docs_dir: PathBuf,
    pub institution_name: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            bind_addr: try_load("BIND_ADDR", "127.0.0.1:3000"),
            database_url: try_load("DATABASE_URL", "postgres://postgres@localhost/docket_system"),
            jwt_secret: try_load("JWT_SECRET", "change-me-please-and-use-long-random"),
            jwt_exp_seconds: try_load("JWT_EXP_SECONDS", "28800"),
            docs_dir: try_load("DOCS_DIR", "data"),
            institution_name: try_load("INSTITUTION_NAME", "Cavendish University Zambia"),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => {
            log::info!("{} not set, using default: {}", key, default);
            default.to_string()
        }
    };

    value
        .parse()
        .map_err(|err| {
            log::warn!("Invalid {} value: {}", key, err);
        })
        .expect("Environment misconfigured!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_when_unset() {
        let port: u16 = try_load("DOCKET_TEST_UNSET_PORT", "8123");
        assert_eq!(port, 8123);
    }

    #[test]
    fn reads_set_variables() {
        env::set_var("DOCKET_TEST_SET_PORT", "9001");
        let port: u16 = try_load("DOCKET_TEST_SET_PORT", "8123");
        assert_eq!(port, 9001);
        env::remove_var("DOCKET_TEST_SET_PORT");
    }
}
