//! Environment variable keys and their aliases.
//!
//! Primary keys use the `GROUPENV_*` prefix; build-tool homes keep the names
//! the build tool itself documents.

/// Directory layout
pub mod paths {
    /// Root under which `group/<name>/...` lives.
    pub const GROUPENV_HOME: &str = "GROUPENV_HOME";
    pub const HOME_ALIASES: &[&str] = &["GROUPENV_ROOT"];
}

/// External build tool used to fetch a group's dependencies
pub mod build_tool {
    /// Explicit path or name of the build tool executable. Wins over everything else.
    pub const GROUPENV_BUILD_TOOL: &str = "GROUPENV_BUILD_TOOL";
    pub const BUILD_TOOL_ALIASES: &[&str] = &["GROUPENV_MAVEN"];

    /// Tool installation homes, checked in order; the executable is `<home>/bin/mvn`.
    pub const MAVEN_HOME: &str = "MAVEN_HOME";
    pub const M2_HOME: &str = "M2_HOME";
}

/// Library discovery and loading
pub mod library {
    /// Loadable archive extension without the leading dot (case-insensitive match).
    pub const GROUPENV_ARCHIVE_EXT: &str = "GROUPENV_ARCHIVE_EXT";

    /// Search path list of the host application's own libraries (export tooling only).
    pub const GROUPENV_HOST_LIB_PATH: &str = "GROUPENV_HOST_LIB_PATH";

    /// Close the superseded loading context when a refresh replaces it.
    pub const GROUPENV_CLOSE_ON_REPLACE: &str = "GROUPENV_CLOSE_ON_REPLACE";
}

/// Observability and logging
pub mod observability {
    pub const GROUPENV_QUIET: &str = "GROUPENV_QUIET";
    pub const QUIET_ALIASES: &[&str] = &[];

    pub const GROUPENV_LOG_LEVEL: &str = "GROUPENV_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["GROUPENV_LOG"];

    pub const GROUPENV_LOG_JSON: &str = "GROUPENV_LOG_JSON";
    pub const LOG_JSON_ALIASES: &[&str] = &[];
}
