//! Job lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as far as dispatch is concerned.
///
/// `Waiting` jobs are offerable and acceptable. `Accepted` jobs carry their
/// assigned vendor forever. `Expired` jobs aged out before anyone took them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Accepted,
    Expired,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Accepted | JobStatus::Expired)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Accepted => write!(f, "accepted"),
            JobStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobStatus::Waiting),
            "accepted" => Ok(JobStatus::Accepted),
            "expired" => Ok(JobStatus::Expired),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_from_str_round_trip() {
        for status in [JobStatus::Waiting, JobStatus::Accepted, JobStatus::Expired] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(JobStatus::Accepted.is_terminal());
        assert!(JobStatus::Expired.is_terminal());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Waiting).unwrap(),
            "\"waiting\""
        );
    }
}
