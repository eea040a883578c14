//! Append-only audit log of who did what to which resource.

pub mod repo;
pub mod repo_types;

pub use repo::record;
pub use repo_types::{Action, ActivityEntry, ResourceType};

#[cfg(test)]
mod tests {
    use super::repo_types::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn verbs_are_snake_case() {
        for a in [
            Action::CreatedTask,
            Action::UpdatedTaskStatus,
            Action::DeletedTask,
            Action::JoinedWorkspace,
        ] {
            let s = a.as_str();
            assert!(s.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{s}");
        }
        assert_eq!(Action::DeletedTask.as_str(), "deleted_task");
    }

    #[test]
    fn entry_keeps_actor_of_deleted_user() {
        let actor = Uuid::new_v4();
        let entry = ActivityEntry::from(ActivityRow {
            id: Uuid::new_v4(),
            user_id: actor,
            action: "updated_task".into(),
            resource_type: "Task".into(),
            resource_id: Uuid::new_v4(),
            details: serde_json::json!({ "description": "x" }),
            created_at: OffsetDateTime::now_utc(),
            user_name: None,
            user_profile_picture: None,
        });
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["user"]["id"], actor.to_string());
        assert!(v["user"]["name"].is_null());
        assert_eq!(v["details"]["description"], "x");
        assert_eq!(v["resourceType"], "Task");
    }
}
