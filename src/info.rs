use serde::{Deserialize, Serialize};

/// Server identity, built once at startup and shared with the handlers and
/// middlewares that report it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    pub name: String,
    pub version: String,
    pub build: String,
    pub build_time: String,
}

impl Info {
    /// Value of the `Server` response header, e.g. `docserve 0.1.0`.
    pub fn server_header(&self) -> String {
        format!("{} {}", self.name, self.version)
    }
}

impl Default for Info {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            build: String::new(),
            build_time: String::new(),
        }
    }
}

impl std::fmt::Display for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.version, self.build, self.build_time)
    }
}
