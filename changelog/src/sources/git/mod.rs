//! Commit log source backed by a local clone.
//!
//! An alternative to gitiles for bulk backfills: clone once (a bare,
//! blob-less clone is enough) and read every range locally.

mod error;
mod executor;
mod parser;

pub use error::GitLogError;
pub use executor::GitExecutor;
pub use parser::{parse_log_output, LOG_FORMAT};

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use std::path::Path;

use super::{CommitDetail, CommitLogSource, LogOptions};
use crate::error::{ClogError, ClogResult};

/// Reads commit history from a local clone with `git log`
pub struct LocalGitLog {
    executor: GitExecutor,
}

impl LocalGitLog {
    pub async fn open(git_dir: &Path) -> Result<Self, GitLogError> {
        let executor = GitExecutor::new(git_dir).await?;
        tracing::info!("Using local git log at {}", executor.git_dir().display());
        Ok(Self { executor })
    }
}

impl CommitLogSource for LocalGitLog {
    fn get_logs<'a>(
        &'a self,
        revision: &str,
        options: &LogOptions,
    ) -> BoxStream<'a, ClogResult<CommitDetail>> {
        let revision = revision.to_string();
        let options = options.clone();

        stream::once(async move {
            let output = self.executor.log(&revision, LOG_FORMAT, &options).await?;
            let commits = parse_log_output(&output)?;
            tracing::debug!(revision = %revision, count = commits.len(), "Parsed git log");
            Ok::<_, ClogError>(stream::iter(commits.into_iter().map(Ok)))
        })
        .try_flatten()
        .boxed()
    }
}
