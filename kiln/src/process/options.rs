use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-launch options for [`launch`](crate::launch).
///
/// # Examples
///
/// ```rust,ignore
/// let options = LaunchOptions::new()
///     .capture_stdout(true)
///     .cwd("build")
///     .stdin("input\n");
/// ```
#[derive(Clone, Debug, Default)]
pub struct LaunchOptions {
    /// Capture stdout in a pipe instead of mixing it into the pty output.
    pub capture_stdout: bool,

    /// Bytes written to the child's terminal input.
    pub stdin: Vec<u8>,

    /// Directory the child runs in. Inherited when `None`.
    pub cwd: Option<PathBuf>,

    /// Complete environment of the child. Inherited when `None`.
    pub env: Option<BTreeMap<String, String>>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = data.into();
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Replaces the child's environment with `vars`.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}
