//! Deployment target and the container entry point it implies.
//!
//! One image has exactly one startup command. The command is never
//! configured directly; it follows from `[deploy].target`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Path of the worker binary inside the runtime image.
pub const IMAGE_BINARY: &str = "app";

/// How the worker is started once deployed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployTarget {
    /// HTTP service; `GET /` starts a sync in the background and returns.
    #[default]
    Service,
    /// HTTP service; `GET /` runs the sync and responds with its outcome.
    Function,
    /// Cloud Run job; one sync per execution, then exit.
    Job,
}

/// Cloud Run resource kind a target deploys as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResource {
    Service,
    Job,
}

impl DeployTarget {
    pub const ALL: [DeployTarget; 3] = [Self::Service, Self::Function, Self::Job];

    /// Container `CMD` for this target, binary first.
    ///
    /// ```
    /// use pcosync_core::DeployTarget;
    ///
    /// assert_eq!(DeployTarget::Job.entry_command(), ["app", "run"]);
    /// ```
    pub fn entry_command(self) -> &'static [&'static str] {
        match self {
            Self::Service => &[IMAGE_BINARY, "serve"],
            Self::Function => &[IMAGE_BINARY, "serve", "--wait"],
            Self::Job => &[IMAGE_BINARY, "run"],
        }
    }

    pub fn resource(self) -> RunResource {
        match self {
            Self::Service | Self::Function => RunResource::Service,
            Self::Job => RunResource::Job,
        }
    }

    /// Whether the running container must listen on the configured port.
    pub fn listens(self) -> bool {
        self.resource() == RunResource::Service
    }

    /// Whether work continues after the trigger response is sent, which
    /// needs CPU allocated outside of requests.
    pub fn works_after_response(self) -> bool {
        self == Self::Service
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Function => "function",
            Self::Job => "job",
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployTarget {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::UnknownTarget(s.to_owned()))
    }
}
