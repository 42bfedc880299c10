//! Names derived from projects, datasets and users.
//!
//! Every step that needs a group, user, namespace or index pattern name gets it from here.

pub const USER_NAME_DELIMITER: &str = "__";
pub const READ_GROUP_SUFFIX: &str = "read";
/// Platform service account, never added to dataset groups.
pub const SERVICE_USER: &str = "srvmanager";

/// `<project>__<user>`
pub fn hdfs_user_name(project: &str, username: &str) -> String {
    format!("{project}{USER_NAME_DELIMITER}{username}")
}

/// `<project>__<dataset>`, the read-write group of a dataset.
pub fn dataset_group(project: &str, dataset: &str) -> String {
    format!("{project}{USER_NAME_DELIMITER}{dataset}")
}

/// `<project>__<dataset>__read`, the group granted read access through the ACL.
pub fn dataset_read_group(project: &str, dataset: &str) -> String {
    format!(
        "{}{USER_NAME_DELIMITER}{READ_GROUP_SUFFIX}",
        dataset_group(project, dataset)
    )
}

/// Kubernetes namespace of a project: lowercased, anything outside `[a-z0-9-]` becomes `-`.
pub fn kube_namespace(project: &str) -> String {
    project
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Kibana index pattern title, e.g. `demo_logs-*`.
pub fn kibana_index_pattern(project: &str, suffix: &str) -> String {
    format!("{}{suffix}", project.to_lowercase())
}

/// Datasets created by the platform for every project.
pub fn is_default_dataset(name: &str) -> bool {
    const BASE: [&str; 7] = [
        "Logs",
        "Resources",
        "Jupyter",
        "Models",
        "Experiments",
        "DataValidation",
        "Statistics",
    ];
    BASE.contains(&name)
        || name.contains("Training_Datasets")
        || name.ends_with(".db")
        || name == "TestJob"
        || name == "TourData"
}

/// Default datasets that carried the sticky bit before per-dataset groups existed.
pub fn is_sticky_default_dataset(name: &str) -> bool {
    name.ends_with(".db") || name == "TourData" || name == "TestJob" || name == "Logs"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names() {
        assert_eq!(dataset_group("P", "D"), "P__D");
        assert_eq!(dataset_read_group("P", "D"), "P__D__read");
        assert_eq!(hdfs_user_name("P", "alice"), "P__alice");
    }

    #[test]
    fn test_kube_namespace() {
        assert_eq!(kube_namespace("Demo_Fraud.2"), "demo-fraud-2");
        assert_eq!(kube_namespace("plain-name9"), "plain-name9");
    }

    #[test]
    fn test_default_datasets() {
        for name in [
            "Logs",
            "Resources",
            "Jupyter",
            "demo_Training_Datasets",
            "demo.db",
            "TestJob",
            "TourData",
        ] {
            assert!(is_default_dataset(name), "{name}");
        }
        assert!(!is_default_dataset("raw_events"));
        assert!(is_sticky_default_dataset("demo.db"));
        assert!(!is_sticky_default_dataset("Resources"));
    }

    #[test]
    fn test_kibana_index_pattern() {
        assert_eq!(kibana_index_pattern("Demo", "_logs-*"), "demo_logs-*");
    }
}
