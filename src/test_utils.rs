// test_utils.rs

#[cfg(test)]
use std::env;
#[cfg(test)]
use std::path::{Path, PathBuf};

/// A scratch directory for binary round-trip tests. Set `KEEP_TEST_OUTPUT`
/// to inspect the written files afterward instead of letting `tempfile`
/// clean them up.
#[cfg(test)]
pub struct TestDir {
    dir: PathBuf,
    _temp_dir: Option<tempfile::TempDir>,
}

#[cfg(test)]
impl TestDir {
    pub fn new(prefix: &str) -> std::io::Result<Self> {
        let keep_output = env::var("KEEP_TEST_OUTPUT").is_ok();

        if keep_output {
            let output_dir = env::current_dir()?.join("test_output").join(prefix);
            std::fs::create_dir_all(&output_dir)?;
            Ok(TestDir {
                dir: output_dir,
                _temp_dir: None,
            })
        } else {
            let temp_dir = tempfile::tempdir()?;
            let dir = temp_dir.path().to_path_buf();
            Ok(TestDir {
                dir,
                _temp_dir: Some(temp_dir),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}
