//! Typed configuration grouped by concern.
//!
//! Every struct loads from the environment with the fallback chains defined
//! in [`super::env_keys`]; tests and embedders construct them directly.

use super::env_keys::{build_tool as tool_keys, library as lib_keys, observability as obv_keys, paths};
use super::loader::{env_bool, env_optional, env_or, load_dotenv};
use std::path::PathBuf;

/// Where group directories live.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Root containing `group/<name>/lib` and `group/<name>/resource`.
    pub home: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let home = env_optional(paths::GROUPENV_HOME, paths::HOME_ALIASES)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".groupenv")
            });
        Self { home }
    }
}

/// How the external build tool is located and driven.
#[derive(Debug, Clone)]
pub struct BuildToolConfig {
    /// Explicit executable; wins over `tool_homes` and `default_program`.
    pub program_override: Option<String>,
    /// Installation homes in priority order; the executable is `<home>/bin/<default_program>`.
    pub tool_homes: Vec<PathBuf>,
    /// Bare program name assumed to be on `PATH`.
    pub default_program: String,
    /// Manifest file name inside the group's library directory.
    pub manifest_file: String,
    /// Subdirectory of the library directory owned by the build tool.
    pub managed_subdir: String,
    /// First invocation: wipe previously fetched dependencies.
    pub clean_args: Vec<String>,
    /// Second invocation: copy declared dependencies into the managed subdirectory.
    /// Runs with `-f <manifest>` prepended.
    pub fetch_args: Vec<String>,
    /// Route invocations through the platform shell (`cmd /c`).
    pub wrap_in_shell: bool,
}

impl Default for BuildToolConfig {
    fn default() -> Self {
        Self {
            program_override: None,
            tool_homes: Vec::new(),
            default_program: "mvn".to_string(),
            manifest_file: "pom.xml".to_string(),
            managed_subdir: "target".to_string(),
            clean_args: vec!["clean".to_string()],
            fetch_args: vec!["dependency:copy-dependencies".to_string()],
            wrap_in_shell: cfg!(windows),
        }
    }
}

impl BuildToolConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let program_override =
            env_optional(tool_keys::GROUPENV_BUILD_TOOL, tool_keys::BUILD_TOOL_ALIASES);
        let tool_homes = [tool_keys::MAVEN_HOME, tool_keys::M2_HOME]
            .iter()
            .filter_map(|key| env_optional(key, &[]))
            .map(PathBuf::from)
            .collect();
        Self {
            program_override,
            tool_homes,
            ..Self::default()
        }
    }
}

/// Library discovery settings.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Loadable archive extension, without the dot.
    pub archive_extension: String,
    /// Directories holding the host application's own libraries.
    pub host_library_path: Vec<PathBuf>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            archive_extension: std::env::consts::DLL_EXTENSION.to_string(),
            host_library_path: default_host_library_path(),
        }
    }
}

impl LibraryConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let archive_extension = env_or(lib_keys::GROUPENV_ARCHIVE_EXT, &[], || {
            std::env::consts::DLL_EXTENSION.to_string()
        })
        .trim_start_matches('.')
        .to_string();
        let host_library_path = env_optional(lib_keys::GROUPENV_HOST_LIB_PATH, &[])
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_else(default_host_library_path);
        Self {
            archive_extension,
            host_library_path,
        }
    }
}

fn default_host_library_path() -> Vec<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .into_iter()
        .collect()
}

/// Refresh behaviour.
#[derive(Debug, Clone, Default)]
pub struct RefreshConfig {
    /// Close the previous loading context and dispose its components when a
    /// refresh installs a new one. Off by default: the superseded context is
    /// only released once nothing references it.
    pub close_replaced_context: bool,
}

impl RefreshConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            close_replaced_context: env_bool(lib_keys::GROUPENV_CLOSE_ON_REPLACE, &[], false),
        }
    }
}

/// Logging configuration: quiet, log_level, log_json.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::GROUPENV_QUIET, obv_keys::QUIET_ALIASES, false),
                log_level: env_or(obv_keys::GROUPENV_LOG_LEVEL, obv_keys::LOG_LEVEL_ALIASES, || {
                    "groupenv=info".to_string()
                }),
                log_json: env_bool(obv_keys::GROUPENV_LOG_JSON, obv_keys::LOG_JSON_ALIASES, false),
            }
        })
    }
}

/// Everything an environment registry needs, loaded together.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub paths: PathsConfig,
    pub build_tool: BuildToolConfig,
    pub library: LibraryConfig,
    pub refresh: RefreshConfig,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            paths: PathsConfig::from_env(),
            build_tool: BuildToolConfig::from_env(),
            library: LibraryConfig::from_env(),
            refresh: RefreshConfig::from_env(),
        }
    }

    /// Defaults rooted at `home`; used by tests and embedders that do not read the environment.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            paths: PathsConfig { home: home.into() },
            build_tool: BuildToolConfig::default(),
            library: LibraryConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}
