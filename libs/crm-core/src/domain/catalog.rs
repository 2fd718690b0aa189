//! Simple reference records: departments, projects, ticket stages and
//! performers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{parse_optional_ref, parse_ref, require_non_empty};
use crate::repository::{Entity, ListFilter, NoFilter, Record};
use crate::CoreError;

// --- Department ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDepartment {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentUpdate {
    pub name: String,
}

impl Entity for Department {
    const KIND: &'static str = "departments";
    const CACHE_TTL_SECONDS: u64 = 300;

    type Create = NewDepartment;
    type Update = DepartmentUpdate;
    type Filter = NoFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn list_filters(&self) -> Vec<NoFilter> {
        vec![NoFilter]
    }
}

impl Record for Department {
    fn from_create(id: Uuid, input: NewDepartment) -> Result<Self, CoreError> {
        require_non_empty("name", &input.name)?;
        Ok(Self {
            id,
            name: input.name,
        })
    }

    fn apply_update(&mut self, input: DepartmentUpdate) -> Result<(), CoreError> {
        require_non_empty("name", &input.name)?;
        self.name = input.name;
        Ok(())
    }

    fn matches(&self, _filter: &NoFilter) -> bool {
        true
    }

    fn sort(items: &mut [Self]) {
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }
}

// --- Project ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: String,
    pub description: Option<String>,
}

impl Entity for Project {
    const KIND: &'static str = "projects";
    const CACHE_TTL_SECONDS: u64 = 300;

    type Create = NewProject;
    type Update = ProjectUpdate;
    type Filter = NoFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn list_filters(&self) -> Vec<NoFilter> {
        vec![NoFilter]
    }
}

impl Record for Project {
    fn from_create(id: Uuid, input: NewProject) -> Result<Self, CoreError> {
        require_non_empty("name", &input.name)?;
        Ok(Self {
            id,
            name: input.name,
            description: input.description,
        })
    }

    fn apply_update(&mut self, input: ProjectUpdate) -> Result<(), CoreError> {
        require_non_empty("name", &input.name)?;
        self.name = input.name;
        self.description = input.description;
        Ok(())
    }

    fn matches(&self, _filter: &NoFilter) -> bool {
        true
    }

    fn sort(items: &mut [Self]) {
        items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }
}

// --- Ticket stage ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub name: String,
    /// Ordering key within the owning department's board.
    pub arrangement: i32,
    pub department_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStage {
    pub name: String,
    pub arrangement: i32,
    pub department_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageUpdate {
    pub name: String,
    pub arrangement: i32,
    pub department_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFilter {
    pub department_id: Option<Uuid>,
}

impl ListFilter for StageFilter {
    fn cache_suffix(&self) -> String {
        match self.department_id {
            Some(id) => format!("dept={id}"),
            None => "dept=*".to_string(),
        }
    }
}

impl Entity for Stage {
    const KIND: &'static str = "stages";
    const CACHE_TTL_SECONDS: u64 = 300;

    type Create = NewStage;
    type Update = StageUpdate;
    type Filter = StageFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn list_filters(&self) -> Vec<StageFilter> {
        vec![
            StageFilter::default(),
            StageFilter {
                department_id: Some(self.department_id),
            },
        ]
    }
}

impl Record for Stage {
    fn from_create(id: Uuid, input: NewStage) -> Result<Self, CoreError> {
        require_non_empty("name", &input.name)?;
        Ok(Self {
            id,
            name: input.name,
            arrangement: input.arrangement,
            department_id: parse_ref("department_id", &input.department_id)?,
        })
    }

    fn apply_update(&mut self, input: StageUpdate) -> Result<(), CoreError> {
        require_non_empty("name", &input.name)?;
        let department_id = parse_ref("department_id", &input.department_id)?;
        self.name = input.name;
        self.arrangement = input.arrangement;
        self.department_id = department_id;
        Ok(())
    }

    fn matches(&self, filter: &StageFilter) -> bool {
        filter.department_id.is_none_or(|id| id == self.department_id)
    }

    fn sort(items: &mut [Self]) {
        items.sort_by(|a, b| {
            a.arrangement
                .cmp(&b.arrangement)
                .then_with(|| a.name.cmp(&b.name))
        });
    }
}

// --- Performer ---

/// A user of the identity store who can be assigned tickets.
///
/// `display_name` and `avatar_url` come from the identity record at read
/// time and are never stored with the performer. `user_id` is `None` for a
/// partner performer not yet linked to an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub position: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPerformer {
    pub user_id: String,
    pub department_id: Option<String>,
    pub position: Option<String>,
}

/// Replaces the performer's mutable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformerUpdate {
    pub department_id: Option<String>,
    pub position: Option<String>,
}

/// Validated form of [`NewPerformer`].
#[derive(Debug, Clone, PartialEq)]
pub struct PerformerDraft {
    pub user_id: Uuid,
    pub department_id: Option<Uuid>,
    pub position: Option<String>,
}

impl NewPerformer {
    pub fn validate(&self) -> Result<PerformerDraft, CoreError> {
        Ok(PerformerDraft {
            user_id: parse_ref("user_id", &self.user_id)?,
            department_id: parse_optional_ref("department_id", self.department_id.as_deref())?,
            position: self.position.clone(),
        })
    }
}

impl Performer {
    pub fn apply_update(&mut self, input: PerformerUpdate) -> Result<(), CoreError> {
        self.department_id = parse_optional_ref("department_id", input.department_id.as_deref())?;
        self.position = input.position;
        Ok(())
    }

    pub fn sort(items: &mut [Self]) {
        items.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

impl Entity for Performer {
    const KIND: &'static str = "performers";
    const CACHE_TTL_SECONDS: u64 = 20;

    type Create = NewPerformer;
    type Update = PerformerUpdate;
    type Filter = NoFilter;

    fn id(&self) -> Uuid {
        self.id
    }

    fn list_filters(&self) -> Vec<NoFilter> {
        vec![NoFilter]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_invalidates_unfiltered_and_department_lists() {
        let department_id = Uuid::new_v4();
        let stage = Stage::from_create(
            Uuid::new_v4(),
            NewStage {
                name: "Backlog".into(),
                arrangement: 0,
                department_id: department_id.to_string(),
            },
        )
        .unwrap();

        let suffixes: Vec<_> = stage.list_filters().iter().map(|f| f.cache_suffix()).collect();
        assert_eq!(suffixes, vec!["dept=*".to_string(), format!("dept={department_id}")]);
    }

    #[test]
    fn stage_with_malformed_department_is_rejected() {
        let err = Stage::from_create(
            Uuid::new_v4(),
            NewStage {
                name: "Backlog".into(),
                arrangement: 0,
                department_id: "sales".into(),
            },
        )
        .unwrap_err();
        match err {
            CoreError::InvalidInput { field, .. } => assert_eq!(field, "department_id"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn stages_sort_by_arrangement() {
        let department_id = Uuid::new_v4();
        let stage = |name: &str, arrangement| Stage {
            id: Uuid::new_v4(),
            name: name.into(),
            arrangement,
            department_id,
        };
        let mut stages = vec![stage("Done", 2), stage("Todo", 0), stage("Doing", 1)];
        Stage::sort(&mut stages);
        let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Todo", "Doing", "Done"]);
    }

    #[test]
    fn stage_filter_matches_department() {
        let department_id = Uuid::new_v4();
        let stage = Stage {
            id: Uuid::new_v4(),
            name: "Todo".into(),
            arrangement: 0,
            department_id,
        };
        assert!(stage.matches(&StageFilter::default()));
        assert!(stage.matches(&StageFilter {
            department_id: Some(department_id)
        }));
        assert!(!stage.matches(&StageFilter {
            department_id: Some(Uuid::new_v4())
        }));
    }

    #[test]
    fn performer_draft_requires_valid_user() {
        let err = NewPerformer {
            user_id: "bob".into(),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        match err {
            CoreError::InvalidInput { field, .. } => assert_eq!(field, "user_id"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }
}
