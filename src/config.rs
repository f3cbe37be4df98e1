use std::{
    env,
    path::{Path, PathBuf},
};

/// Environment variable with the directory the acquisition server publishes its runs in
pub const SERVER_ROOT_VAR: &str = "HIPERCAM_SERVER";

/// Settings shared by the command line tools
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root directory of the served runs
    pub server_root: PathBuf,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            server_root: PathBuf::from("."),
        }
    }
}
impl Config {
    /// Reads the settings from the environment
    ///
    /// Returns the server root from the "HIPERCAM_SERVER" environment variable if it is set,
    /// otherwise the current directory
    pub fn from_env() -> Self {
        env::var(SERVER_ROOT_VAR)
            .map(|root| Self::default().server_root(root))
            .unwrap_or_default()
    }
    pub fn server_root<P: AsRef<Path>>(self, path: P) -> Self {
        Self {
            server_root: path.as_ref().to_path_buf(),
        }
    }
}
