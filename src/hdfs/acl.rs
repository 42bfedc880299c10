use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclScope {
    Access,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclType {
    User,
    Group,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAction {
    None,
    ReadExecute,
    All,
}

impl FsAction {
    pub fn symbol(self) -> &'static str {
        match self {
            FsAction::None => "---",
            FsAction::ReadExecute => "r-x",
            FsAction::All => "rwx",
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            FsAction::None => 0,
            FsAction::ReadExecute => 0o5,
            FsAction::All => 0o7,
        }
    }
}

/// One entry of an ACL spec, rendered the way WebHDFS `aclspec` expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub scope: AclScope,
    pub kind: AclType,
    pub name: Option<String>,
    pub action: FsAction,
}

impl AclEntry {
    pub fn access(kind: AclType, action: FsAction) -> Self {
        Self {
            scope: AclScope::Access,
            kind,
            name: None,
            action,
        }
    }

    pub fn named(scope: AclScope, kind: AclType, name: &str, action: FsAction) -> Self {
        Self {
            scope,
            kind,
            name: Some(name.to_string()),
            action,
        }
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope == AclScope::Default {
            f.write_str("default:")?;
        }
        let kind = match self.kind {
            AclType::User => "user",
            AclType::Group => "group",
            AclType::Other => "other",
        };
        write!(
            f,
            "{kind}:{}:{}",
            self.name.as_deref().unwrap_or(""),
            self.action.symbol()
        )
    }
}

/// Joins entries into a comma separated `aclspec`.
pub fn acl_spec(entries: &[AclEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Owner and group get full access, the read group gets read/execute now and on new children.
pub fn dataset_acl(read_group: &str) -> Vec<AclEntry> {
    vec![
        AclEntry::access(AclType::User, FsAction::All),
        AclEntry::access(AclType::Group, FsAction::All),
        AclEntry::named(AclScope::Access, AclType::Group, read_group, FsAction::ReadExecute),
        AclEntry::access(AclType::Other, FsAction::None),
        AclEntry::named(AclScope::Default, AclType::Group, read_group, FsAction::ReadExecute),
    ]
}

/// Read-only state of a public dataset. Merged into the existing ACL so the
/// read group entry survives.
pub fn immutable_acl() -> Vec<AclEntry> {
    vec![
        AclEntry::access(AclType::User, FsAction::ReadExecute),
        AclEntry::access(AclType::Group, FsAction::ReadExecute),
        AclEntry::access(AclType::Other, FsAction::None),
    ]
}

/// Default state of a private dataset, merged like [`immutable_acl`].
pub fn mutable_acl() -> Vec<AclEntry> {
    vec![
        AclEntry::access(AclType::User, FsAction::All),
        AclEntry::access(AclType::Group, FsAction::All),
        AclEntry::access(AclType::Other, FsAction::None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_acl_spec() {
        assert_eq!(
            acl_spec(&dataset_acl("P__D__read")),
            "user::rwx,group::rwx,group:P__D__read:r-x,other::---,default:group:P__D__read:r-x"
        );
    }

    #[test]
    fn test_immutable_acl_spec() {
        assert_eq!(acl_spec(&immutable_acl()), "user::r-x,group::r-x,other::---");
        assert_eq!(acl_spec(&mutable_acl()), "user::rwx,group::rwx,other::---");
    }
}
