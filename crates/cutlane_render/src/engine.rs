use crate::error::{RenderError, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit engine binary.
pub const ENGINE_ENV: &str = "FFMPEG_PATH";

fn engine_file_name() -> &'static str {
    if cfg!(windows) {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Find the engine binary: the managed install directory first, then an
/// explicit override (argument, else `FFMPEG_PATH`), then `PATH`.
pub fn locate_engine(managed_dir: Option<&Path>, explicit: Option<&Path>) -> Result<PathBuf> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(ENGINE_ENV).map(PathBuf::from));
    locate_with(managed_dir, explicit.as_deref(), env::var_os("PATH"))
}

fn locate_with(
    managed_dir: Option<&Path>,
    explicit: Option<&Path>,
    path_var: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(dir) = managed_dir {
        let candidate = dir.join(engine_file_name());
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using managed engine");
            return Ok(candidate);
        }
    }

    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "configured engine path is not a file");
    }

    if let Some(path_var) = path_var {
        for dir in env::split_paths(&path_var) {
            let candidate = dir.join(engine_file_name());
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(RenderError::EngineNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn install(dir: &Path) -> PathBuf {
        let path = dir.join(engine_file_name());
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn managed_dir_takes_precedence() {
        let managed = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let expected = install(managed.path());
        let explicit = install(other.path());

        let found = locate_with(
            Some(managed.path()),
            Some(&explicit),
            Some(other.path().as_os_str().to_owned()),
        )
        .unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn explicit_override_before_path() {
        let managed = TempDir::new().unwrap();
        let explicit_dir = TempDir::new().unwrap();
        let on_path = TempDir::new().unwrap();
        let explicit = install(explicit_dir.path());
        install(on_path.path());

        let found = locate_with(
            Some(managed.path()),
            Some(&explicit),
            Some(on_path.path().as_os_str().to_owned()),
        )
        .unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn falls_back_to_path_search() {
        let empty = TempDir::new().unwrap();
        let on_path = TempDir::new().unwrap();
        let expected = install(on_path.path());
        let path_var = env::join_paths([empty.path(), on_path.path()]).unwrap();

        let found = locate_with(None, Some(Path::new("/no/such/ffmpeg")), Some(path_var)).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let empty = TempDir::new().unwrap();
        let result = locate_with(
            Some(empty.path()),
            None,
            Some(empty.path().as_os_str().to_owned()),
        );
        assert!(matches!(result, Err(RenderError::EngineNotFound)));
    }
}
