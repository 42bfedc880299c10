use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Access model of a dataset or of a share, stored as its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetPermission {
    Editable,
    ReadOnly,
    EditableByOwners,
}

#[derive(Error, Debug, PartialEq)]
#[error("unknown dataset permission: {0}")]
pub struct UnknownPermission(pub String);

impl DatasetPermission {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetPermission::Editable => "EDITABLE",
            DatasetPermission::ReadOnly => "READ_ONLY",
            DatasetPermission::EditableByOwners => "EDITABLE_BY_OWNERS",
        }
    }
}

impl FromStr for DatasetPermission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EDITABLE" => Ok(DatasetPermission::Editable),
            "READ_ONLY" => Ok(DatasetPermission::ReadOnly),
            "EDITABLE_BY_OWNERS" => Ok(DatasetPermission::EditableByOwners),
            other => Err(UnknownPermission(other.to_string())),
        }
    }
}

impl fmt::Display for DatasetPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a project member as stored in `project_team.team_role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRole {
    DataOwner,
    DataScientist,
    UnderRemoval,
    Other(String),
}

impl ProjectRole {
    pub const DATA_OWNER: &'static str = "Data owner";
    pub const DATA_SCIENTIST: &'static str = "Data scientist";
    pub const UNDER_REMOVAL: &'static str = "Under removal";

    pub fn parse(s: &str) -> Self {
        match s {
            Self::DATA_OWNER => ProjectRole::DataOwner,
            Self::DATA_SCIENTIST => ProjectRole::DataScientist,
            Self::UNDER_REMOVAL => ProjectRole::UnderRemoval,
            other => ProjectRole::Other(other.to_string()),
        }
    }
}
