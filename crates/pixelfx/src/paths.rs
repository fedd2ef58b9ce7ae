use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "PIXELFX_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "PIXELFX_DATA_DIR";
pub const ENV_SHARE_DIR: &str = "PIXELFX_SHARE_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "pixelfx";
const APPLICATION: &str = "pixelfx";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    share_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;

        let config_dir = resolve_dir(ENV_CONFIG_DIR, project_dirs.config_dir());
        let data_dir = resolve_dir(ENV_DATA_DIR, project_dirs.data_dir());
        let share_dir = resolve_share_dir(&project_dirs);

        Ok(Self {
            config_dir,
            data_dir,
            share_dir,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Roots searched for `effects/` and `libs/`, highest priority first.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        vec![
            self.config_dir.clone(),
            self.data_dir.clone(),
            self.share_dir.clone(),
        ]
    }

    /// Root that packages and scaffolded effects are written to.
    pub fn install_root(&self) -> &Path {
        &self.data_dir
    }
}

fn resolve_dir(env_var: &str, default: &Path) -> PathBuf {
    env_override(env_var).unwrap_or_else(|| default.to_path_buf())
}

fn resolve_share_dir(project_dirs: &ProjectDirs) -> PathBuf {
    env_override(ENV_SHARE_DIR).unwrap_or_else(|| default_share_dir(project_dirs))
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(target_family = "unix")]
fn default_share_dir(_: &ProjectDirs) -> PathBuf {
    PathBuf::from("/usr/share/pixelfx")
}

#[cfg(not(target_family = "unix"))]
fn default_share_dir(project_dirs: &ProjectDirs) -> PathBuf {
    project_dirs.data_dir().to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        key: &'static str,
        previous: Option<OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &Path) -> Self {
            let previous = env::var_os(key);
            env::set_var(key, value);
            Self { key, previous }
        }

        fn clear(key: &'static str) -> Self {
            let previous = env::var_os(key);
            env::remove_var(key);
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = self.previous.take() {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn env_overrides_take_precedence() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let config_dir = root.path().join("config");
        let data_dir = root.path().join("data");
        let share_dir = root.path().join("share");

        let _config_guard = EnvGuard::set(ENV_CONFIG_DIR, &config_dir);
        let _data_guard = EnvGuard::set(ENV_DATA_DIR, &data_dir);
        let _share_guard = EnvGuard::set(ENV_SHARE_DIR, &share_dir);

        let paths = AppPaths::discover().unwrap();

        assert_eq!(paths.config_dir(), config_dir.as_path());
        assert_eq!(paths.data_dir(), data_dir.as_path());
        assert_eq!(paths.share_dir(), share_dir.as_path());
        assert_eq!(paths.config_file(), config_dir.join("config.toml"));
        assert_eq!(paths.search_roots(), vec![config_dir, data_dir.clone(), share_dir]);
        assert_eq!(paths.install_root(), data_dir.as_path());
    }

    #[test]
    fn empty_override_falls_back_to_default() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();
        let default = root.path().join("default");

        let _data_guard = EnvGuard::set(ENV_DATA_DIR, Path::new(""));
        assert_eq!(resolve_dir(ENV_DATA_DIR, &default), default);

        let _data_guard = EnvGuard::set(ENV_DATA_DIR, &root.path().join("data"));
        assert_eq!(resolve_dir(ENV_DATA_DIR, &default), root.path().join("data"));
    }

    #[cfg(target_family = "unix")]
    #[test]
    fn default_share_dir_on_unix_matches_usr_share() {
        let _guard = env_lock().lock().unwrap();
        let root = TempDir::new().unwrap();

        let _config_guard = EnvGuard::set(ENV_CONFIG_DIR, &root.path().join("config"));
        let _data_guard = EnvGuard::set(ENV_DATA_DIR, &root.path().join("data"));
        let _share_guard = EnvGuard::clear(ENV_SHARE_DIR);

        let paths = AppPaths::discover().unwrap();

        assert_eq!(paths.share_dir(), Path::new("/usr/share/pixelfx"));
    }
}
