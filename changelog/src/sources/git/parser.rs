//! Parsing of separator-delimited `git log` output.

use super::GitLogError;
use crate::model::Signature;
use crate::sources::CommitDetail;

/// Separator used in git log format output.
pub const FIELD_SEPARATOR: &str = "␞"; // ASCII Record Separator
pub const COMMIT_SEPARATOR: &str = "␝"; // ASCII Group Separator

/// Git log format producing one record per commit.
pub const LOG_FORMAT: &str = concat!(
    "%H", "␞", // hash
    "%an", "␞", // author name
    "%ae", "␞", // author email
    "%aI", "␞", // author date (strict ISO)
    "%cn", "␞", // committer name
    "%ce", "␞", // committer email
    "%cI", "␞", // committer date (strict ISO)
    "%B", // raw message
    "␝"   // commit separator
);

const FIELD_COUNT: usize = 8;

/// Parse git log output into commit details. Malformed records are skipped;
/// output with records but none well-formed is an error.
pub fn parse_log_output(output: &str) -> Result<Vec<CommitDetail>, GitLogError> {
    let mut commits = Vec::new();
    let mut malformed = 0;

    for record in output.split(COMMIT_SEPARATOR) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }

        let fields: Vec<&str> = record.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
        if fields.len() < FIELD_COUNT {
            malformed += 1;
            continue;
        }

        commits.push(CommitDetail {
            commit: fields[0].to_string(),
            author: Signature {
                name: fields[1].to_string(),
                email: fields[2].to_string(),
                date: fields[3].to_string(),
            },
            committer: Signature {
                name: fields[4].to_string(),
                email: fields[5].to_string(),
                date: fields[6].to_string(),
            },
            message: fields[7].trim().to_string(),
        });
    }

    if commits.is_empty() && malformed > 0 {
        return Err(GitLogError::MalformedLog(format!(
            "{} malformed log records",
            malformed
        )));
    }

    Ok(commits)
}
