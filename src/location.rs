//! Where bundle documents live.
//!
//! A registry may have a base directory, chosen by [`ConfigDir`]:
//!
//! - `Platform`: the platform config directory for the app name
//!   (e.g. `~/.config/{app_name}/` on Linux). Requires an app name.
//! - `Home(sub)`: `~/{sub}`.
//! - `Cwd`: the working directory at build time.
//! - `Path(p)`: `p` as given.
//!
//! Relative bundle locations are joined onto the base directory; absolute
//! locations are used unchanged.

use std::path::{Path, PathBuf};

use crate::error::BindError;
use crate::types::ConfigDir;

/// Resolve `dir` to a concrete directory.
///
/// Returns `Ok(None)` if the directory cannot be determined (e.g. no home
/// directory), in which case relative locations stay relative.
pub fn resolve_config_dir(
    dir: &ConfigDir,
    app_name: Option<&str>,
) -> Result<Option<PathBuf>, BindError> {
    Ok(match dir {
        ConfigDir::Platform => {
            let app_name = app_name.ok_or(BindError::AppNameRequired)?;
            directories::ProjectDirs::from("", "", app_name)
                .map(|proj| proj.config_dir().to_path_buf())
        }
        ConfigDir::Home(subdir) => {
            directories::UserDirs::new().map(|user| user.home_dir().join(subdir))
        }
        ConfigDir::Cwd => std::env::current_dir().ok(),
        ConfigDir::Path(p) => Some(p.clone()),
    })
}

/// Join a relative `location` onto `base`.
pub fn resolve_location(base: Option<&Path>, location: &Path) -> PathBuf {
    match base {
        Some(base) if location.is_relative() => base.join(location),
        _ => location.to_path_buf(),
    }
}
