use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::TryStreamExt;
use thiserror::Error;
use tokio::{io, task::JoinError};

use crate::format::{self, LINE_WIDTH};
use crate::task::{self, FanIn};

pub const DEFAULT_INPUT_DIR: &str = "assets";
pub const DEFAULT_OUTPUT_DIR: &str = "tmp";
pub const DEFAULT_EXTENSION: &str = "txt";

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Panicked(#[from] JoinError),
    #[error("{pending} of {expected} files still pending after deadline")]
    Deadline { expected: usize, pending: usize },
    #[error("{pending} formatted files lost")]
    Lost { pending: usize },
}

impl From<task::Error<Error>> for Error {
    fn from(err: task::Error<Error>) -> Self {
        match err {
            task::Error::Task(err) => err,
            task::Error::Join(err) => Self::Panicked(err),
            task::Error::Deadline { expected, pending } => Self::Deadline { expected, pending },
            task::Error::Lost { pending } => Self::Lost { pending },
        }
    }
}

/// A formatted text, with the input file it has been read from.
#[derive(Debug)]
struct Formatted {
    source: PathBuf,
    data: Bytes,
}

/// A written output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    /// The input file the text has been read from.
    pub source: PathBuf,
    /// The output file the formatted text has been written to.
    pub path: PathBuf,
    /// Length of the formatted text, in bytes.
    pub len: usize,
}

/// Text files dispatcher.
///
/// Formats every input file in its own task and writes the results to the output directory in the order they complete.
#[derive(Debug)]
pub struct Dispatcher {
    input_dir: PathBuf,
    output_dir: PathBuf,
    extension: String,
    width: NonZeroUsize,
    deadline: Option<Duration>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_DIR.into(), DEFAULT_OUTPUT_DIR.into())
    }
}

impl Dispatcher {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            extension: DEFAULT_EXTENSION.to_owned(),
            width: LINE_WIDTH,
            deadline: None,
        }
    }

    #[inline]
    pub fn with_extension(self, extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..self
        }
    }

    #[inline]
    pub fn with_width(self, width: NonZeroUsize) -> Self {
        Self { width, ..self }
    }

    #[inline]
    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    #[inline]
    pub fn input_dir(&self) -> &Path {
        self.input_dir.as_path()
    }

    #[inline]
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_path()
    }

    /// Format all `inputs` concurrently and write them to the output directory as they complete.
    ///
    /// Inputs are resolved against the input directory. Written files are returned in completion order.
    /// The first failure aborts the whole run, remaining tasks included.
    pub async fn run(&self, inputs: &[impl AsRef<Path>]) -> Result<Vec<Written>, Error> {
        let mut fan_in = FanIn::with_capacity(inputs.len());

        if let Some(deadline) = self.deadline {
            fan_in = fan_in.with_deadline(deadline);
        }

        for input in inputs {
            let path = self.input_dir.join(input);
            let width = self.width;

            fan_in.spawn(async move {
                let data = format::read_and_format(&path, width).await?;

                Ok::<_, Error>(Formatted { source: path, data })
            });
        }

        tracing::debug!("Dispatched {} text files", fan_in.expected());

        fan_in
            .into_stream()
            .err_into::<Error>()
            .and_then(|formatted| self.write(formatted))
            .try_collect()
            .await
    }

    /// Return the output path of a formatted text of `len` bytes.
    ///
    /// Since it only depends on the length, texts of the same length are written to the same file.
    pub fn output_path(&self, len: usize) -> PathBuf {
        self.output_dir.join(len.to_string()).with_extension(&self.extension)
    }

    async fn write(&self, formatted: Formatted) -> Result<Written, Error> {
        let len = formatted.data.len();
        let path = self.output_path(len);

        tracing::info!("Writing file of length: {len}");

        tokio::fs::write(&path, &formatted.data).await.map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("Written `{}` to `{}`", formatted.source.display(), path.display());

        Ok(Written {
            source: formatted.source,
            path,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn text_of(len: usize) -> Vec<u8> {
        let mut text = Vec::with_capacity(len);
        let mut i = 0;

        while text.len() < len {
            let word = match i % 11 {
                0 => "\n\n    ".to_owned(),
                5 => "  \t\n".to_owned(),
                _ => format!("word{i} "),
            };
            text.extend_from_slice(word.as_bytes());
            i += 1;
        }

        text.truncate(len);
        text
    }

    fn setup(files: &[(&str, &[u8])]) -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("assets");
        let output_dir = dir.path().join("tmp");

        std::fs::create_dir(&input_dir).unwrap();
        std::fs::create_dir(&output_dir).unwrap();

        for (name, contents) in files {
            std::fs::write(input_dir.join(name), contents).unwrap();
        }

        (dir, Dispatcher::new(input_dir, output_dir))
    }

    fn output_files(dispatcher: &Dispatcher) -> HashSet<PathBuf> {
        std::fs::read_dir(dispatcher.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn test_output_path() {
        let dispatcher = Dispatcher::new("in".into(), "a/b".into()).with_extension("md");

        assert!(dispatcher.output_path(12345).iter().eq(["a", "b", "12345.md"]));
        assert_eq!(Dispatcher::default().output_path(0), Path::new("tmp/0.txt"));
    }

    #[tokio::test]
    async fn test_no_input() {
        let (_dir, dispatcher) = setup(&[]);

        let written = dispatcher.run(&[] as &[&str]).await.unwrap();

        assert!(written.is_empty());
        assert!(output_files(&dispatcher).is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_single_input() {
        let (_dir, dispatcher) = setup(&[("single.txt", b"Hello,\n\n   world!\n  this is   \nconcurrency.\n")]);

        let written = dispatcher.run(&["single.txt"]).await.unwrap();

        let expected = b"Hello, world! this is concurrency.";
        assert_eq!(
            written,
            [Written {
                source: dispatcher.input_dir().join("single.txt"),
                path: dispatcher.output_path(expected.len()),
                len: expected.len(),
            }]
        );
        assert_eq!(std::fs::read(&written[0].path).unwrap(), expected);
        assert!(logs_contain("Writing file of length: 34"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_many_inputs_any_order() {
        let largest = text_of(249_000);
        let median = text_of(155_000);
        let shortest = text_of(70_000);

        let (_dir, dispatcher) = setup(&[
            ("at_the_mountains_of_madness.txt", &largest),
            ("the_shadow_over_innsmouth.txt", &median),
            ("the_call_of_cthulhu.txt", &shortest),
        ]);

        let written = dispatcher
            .run(&["at_the_mountains_of_madness.txt", "the_shadow_over_innsmouth.txt", "the_call_of_cthulhu.txt"])
            .await
            .unwrap();

        assert_eq!(written.len(), 3);

        let expected: HashSet<_> = [&largest, &median, &shortest]
            .into_iter()
            .map(|raw| {
                let text = format::format(raw);
                let path = dispatcher.output_path(text.len());

                assert_eq!(std::fs::read(&path).unwrap(), text);

                path
            })
            .collect();

        assert_eq!(output_files(&dispatcher), expected);
        assert_eq!(written.iter().map(|w| w.path.clone()).collect::<HashSet<_>>(), expected);
    }

    #[tokio::test]
    async fn test_same_length_outputs_collide() {
        let (_dir, dispatcher) = setup(&[("first.txt", b"  alpha\n\nbeta"), ("second.txt", b"gamma\n  delt\n")]);

        let written = dispatcher.run(&["first.txt", "second.txt"]).await.unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(written[0].path, written[1].path);
        assert_eq!(written[0].path, dispatcher.output_path(10));
        assert_eq!(output_files(&dispatcher).len(), 1);

        // the last completed write wins
        let last = std::fs::read(&written[1].path).unwrap();
        let expected: &[u8] = if written[1].source.ends_with("first.txt") { b"alpha beta" } else { b"gamma delt" };
        assert_eq!(last, expected);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let (_dir, dispatcher) = setup(&[("present.txt", b"present")]);

        match dispatcher.run(&["present.txt", "missing.txt"]).await {
            Err(Error::Read { path, source }) => {
                assert_eq!(path, dispatcher.input_dir().join("missing.txt"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_output_dir() {
        let (dir, _) = setup(&[("present.txt", b"present")]);
        let dispatcher = Dispatcher::new(dir.path().join("assets"), dir.path().join("missing"));

        match dispatcher.run(&["present.txt"]).await {
            Err(Error::Write { path, .. }) => assert_eq!(path, dispatcher.output_path(7)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
