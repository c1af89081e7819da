use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::MigrationError;

/// RDBMS engine identity.
///
/// Every dialect-specific behavior in the crate is keyed on this enum:
/// the adapter registry, the connection URL scheme, the type mapper's
/// native orderings and the attribute-applicability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Oracle,
    Postgres,
    SqlServer,
    Mysql,
}

impl Engine {
    pub const ALL: [Engine; 4] = [
        Engine::Oracle,
        Engine::Postgres,
        Engine::SqlServer,
        Engine::Mysql,
    ];

    /// Lowercase identifier, matching the configuration section names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Oracle => "oracle",
            Engine::Postgres => "postgres",
            Engine::SqlServer => "sqlserver",
            Engine::Mysql => "mysql",
        }
    }

    /// Conventional port used when the configuration omits one.
    pub fn default_port(&self) -> u16 {
        match self {
            Engine::Oracle => 1521,
            Engine::Postgres => 5432,
            Engine::SqlServer => 1433,
            Engine::Mysql => 3306,
        }
    }

    /// Whether the `client` connection attribute (instant-client library
    /// path) applies to this engine.
    pub fn accepts_client(&self) -> bool {
        matches!(self, Engine::Oracle)
    }

    /// Whether the `driver` connection attribute (access driver name)
    /// applies to this engine.
    pub fn accepts_driver(&self) -> bool {
        matches!(self, Engine::SqlServer)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oracle" => Ok(Engine::Oracle),
            "postgres" | "postgresql" => Ok(Engine::Postgres),
            "sqlserver" | "mssql" => Ok(Engine::SqlServer),
            "mysql" => Ok(Engine::Mysql),
            other => Err(MigrationError::invalid_value(
                other,
                "not a supported RDBMS engine",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_engines() {
        assert_eq!("oracle".parse::<Engine>().unwrap(), Engine::Oracle);
        assert_eq!("POSTGRES".parse::<Engine>().unwrap(), Engine::Postgres);
        assert_eq!("postgresql".parse::<Engine>().unwrap(), Engine::Postgres);
        assert_eq!("sqlserver".parse::<Engine>().unwrap(), Engine::SqlServer);
        assert_eq!("mssql".parse::<Engine>().unwrap(), Engine::SqlServer);
        assert_eq!("mysql".parse::<Engine>().unwrap(), Engine::Mysql);
    }

    #[test]
    fn parse_unknown_engine_is_invalid_value() {
        let err = "sqlite".parse::<Engine>().unwrap_err();
        assert_eq!(err.code(), 142);
    }

    #[test]
    fn attribute_applicability() {
        assert!(Engine::Oracle.accepts_client());
        assert!(!Engine::Postgres.accepts_client());
        assert!(Engine::SqlServer.accepts_driver());
        assert!(!Engine::Oracle.accepts_driver());
    }

    #[test]
    fn display_round_trips() {
        for engine in Engine::ALL {
            assert_eq!(engine.to_string().parse::<Engine>().unwrap(), engine);
        }
    }
}
