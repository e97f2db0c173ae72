//! Database engine profiles.
//!
//! Only the engines listed here are supported. Any other engine string is a
//! configuration error, raised before any port is allocated.

use std::fmt;
use std::str::FromStr;

use super::error::AccessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Mysql,
    Postgres,
}

/// Static parameters for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineProfile {
    pub engine: Engine,
    pub default_port: u16,
    /// Client launched when found on PATH.
    pub primary_client: &'static str,
    /// Client launched when the primary one is missing.
    pub fallback_client: &'static str,
}

const MYSQL: EngineProfile = EngineProfile {
    engine: Engine::Mysql,
    default_port: 3306,
    primary_client: "mycli",
    fallback_client: "mysql",
};

const POSTGRES: EngineProfile = EngineProfile {
    engine: Engine::Postgres,
    default_port: 5432,
    primary_client: "pgcli",
    fallback_client: "psql",
};

impl Engine {
    pub fn profile(self) -> &'static EngineProfile {
        match self {
            Engine::Mysql => &MYSQL,
            Engine::Postgres => &POSTGRES,
        }
    }

    /// The mysql clients need user and database as positional arguments.
    pub fn needs_positional_args(self) -> bool {
        self == Engine::Mysql
    }
}

impl FromStr for Engine {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(Engine::Mysql),
            "postgres" => Ok(Engine::Postgres),
            other => Err(AccessError::Config(format!(
                "unsupported engine '{other}' (expected mysql or postgres)"
            ))),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Mysql => write!(f, "mysql"),
            Engine::Postgres => write!(f, "postgres"),
        }
    }
}
